//! Create command: register and bootstrap nodes.

use anyhow::{Context, Result};
use clap::Args;
use pexnode_provision::{exit_code, ManagerConnection, ProvisionTarget, ProvisioningRequest};
use serde::Deserialize;

use crate::output::print_reports;

use super::{CommandContext, NodeFields, DEFAULT_NETMASK};

/// Create command arguments.
#[derive(Debug, Args)]
pub struct CreateCommand {
    /// Hostname of the node to create.
    ///
    /// May also be a JSON object, or a JSON array of objects, each with a
    /// "hostname" key and any per-node overrides of the flags below.
    hostname: String,

    #[command(flatten)]
    fields: NodeFields,
}

/// One host entry from the positional argument.
#[derive(Debug, Deserialize)]
pub struct HostEntry {
    pub hostname: String,
    #[serde(flatten)]
    pub fields: NodeFields,
}

/// Parse the positional hostname argument.
///
/// Returns the entries and whether they form a batch.
pub fn parse_hosts(arg: &str) -> Result<(Vec<HostEntry>, bool)> {
    let trimmed = arg.trim();
    if trimmed.starts_with('[') {
        let entries: Vec<HostEntry> =
            serde_json::from_str(trimmed).context("Failed to parse hostname list as JSON")?;
        Ok((entries, true))
    } else if trimmed.starts_with('{') {
        let entry: HostEntry =
            serde_json::from_str(trimmed).context("Failed to parse hostname object as JSON")?;
        Ok((vec![entry], false))
    } else {
        let entry = HostEntry {
            hostname: trimmed.to_string(),
            fields: NodeFields::default(),
        };
        Ok((vec![entry], false))
    }
}

/// Build a request, layering per-node values over flags over config file.
pub fn build_request(
    entry: HostEntry,
    flags: &NodeFields,
    defaults: &NodeFields,
    connection: &ManagerConnection,
) -> ProvisioningRequest {
    let fields = entry.fields.or(flags).or(defaults);

    ProvisioningRequest {
        hostname: Some(entry.hostname),
        domain: fields.domain,
        private_ip: fields.private_ip,
        public_ip: fields.public_ip,
        netmask: fields.netmask.or_else(|| Some(DEFAULT_NETMASK.to_string())),
        gateway: fields.gateway,
        node_password: fields.node_password,
        tls_certificate_subject_name: fields.tls_certificate_subject_name,
        system_location_name: fields.system_location_name,
        connection: Some(connection.clone()),
    }
}

impl CreateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<i32> {
        let connection = ctx.connection()?;
        let (entries, batch) = parse_hosts(&self.hostname)?;

        let mut requests: Vec<ProvisioningRequest> = entries
            .into_iter()
            .map(|entry| build_request(entry, &self.fields, &ctx.defaults, &connection))
            .collect();

        let target = match (batch, requests.len()) {
            (false, 1) => ProvisionTarget::Single(requests.remove(0)),
            _ => ProvisionTarget::Batch(requests),
        };

        let mut provisioner = ctx.provisioner()?;
        let reports = provisioner.create_all(target).await;

        print_reports(&reports);
        Ok(exit_code(&reports))
    }
}
