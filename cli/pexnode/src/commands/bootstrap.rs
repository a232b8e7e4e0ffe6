//! Bootstrap command: re-send a saved payload to a node.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::output::print_bootstrap_report;

use super::CommandContext;

/// Bootstrap command arguments.
#[derive(Debug, Args)]
pub struct BootstrapCommand {
    /// The XML file to bootstrap the node with, e.g. one written by a failed `create`.
    #[arg(long)]
    xml_file: PathBuf,

    /// Domain name or private IP address of the node.
    #[arg(long)]
    node_address: String,

    /// Name to report the node as. Defaults to the node address.
    #[arg(long)]
    hostname: Option<String>,
}

impl BootstrapCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<i32> {
        let hostname = self.hostname.as_deref().unwrap_or(&self.node_address);
        let provisioner = ctx.provisioner()?;

        let report = provisioner
            .bootstrap_from_file(&self.xml_file, &self.node_address, hostname)
            .await
            .with_context(|| format!("Failed to bootstrap {hostname}"))?;

        print_bootstrap_report(&report);
        Ok(if report.outcome.is_success() { 0 } else { 1 })
    }
}
