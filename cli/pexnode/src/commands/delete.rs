//! Delete command: remove node records from the manager.

use anyhow::Result;
use clap::Args;
use pexnode_provision::{exit_code, ProvisionTarget, ProvisioningRequest};

use crate::output::print_reports;

use super::create::parse_hosts;
use super::CommandContext;

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Hostname of the node to remove, or a JSON array of host objects.
    hostname: String,
}

impl DeleteCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<i32> {
        let connection = ctx.connection()?;
        let (entries, _) = parse_hosts(&self.hostname)?;

        let requests: Vec<_> = entries
            .into_iter()
            .map(|entry| ProvisioningRequest::new(entry.hostname, connection.clone()))
            .collect();

        let mut provisioner = ctx.provisioner()?;
        let reports = provisioner.remove_all(ProvisionTarget::Batch(requests)).await;

        print_reports(&reports);
        Ok(exit_code(&reports))
    }
}
