//! CLI commands.

mod bootstrap;
mod create;
mod delete;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pexnode_provision::{
    BootstrapSettings, ManagerConnection, Provisioner, RetryPolicy, TransportConfig,
};
use serde::Deserialize;

use crate::config::FileConfig;

/// Default netmask for new nodes.
const DEFAULT_NETMASK: &str = "255.255.255.0";

/// Default manager user.
const DEFAULT_AUTH_USER: &str = "admin";

/// pexnode - provision conferencing transcoder nodes.
#[derive(Debug, Parser)]
#[command(name = "pexnode")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// URL of the management node. Overrides MANAGER_URL in the config file.
    #[arg(long, global = true, env = "PEXNODE_MANAGER_URL")]
    manager_url: Option<String>,

    /// Name of the JSON config file in the config directory, e.g. 'prod.config.json'.
    #[arg(long, global = true)]
    config_file: Option<String>,

    /// Skip TLS certificate verification for the management node.
    #[arg(long, global = true)]
    insecure: bool,

    /// User to authenticate against the manager with.
    #[arg(short = 'u', long, global = true, env = "MEETING_MANAGER_USER")]
    auth_user: Option<String>,

    /// Password to authenticate against the manager with.
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "MEETING_MANAGER_PASS",
        hide_env_values = true
    )]
    auth_pass: Option<String>,

    /// Retries after the first attempt for transient failures.
    #[arg(long, global = true, default_value_t = pexnode_provision::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Backoff factor in seconds; waits are factor * 1, 2, 4, 8, ...
    #[arg(long, global = true, default_value_t = 1.0)]
    backoff_factor: f64,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register one or more nodes on the manager and bootstrap them.
    Create(create::CreateCommand),

    /// Remove node records from the manager.
    Delete(delete::DeleteCommand),

    /// Re-send a saved bootstrap payload to a node.
    Bootstrap(bootstrap::BootstrapCommand),
}

impl Cli {
    pub fn log_json(&self) -> bool {
        self.log_json
    }

    /// Run the CLI command, returning the process exit code.
    pub async fn run(self) -> Result<i32> {
        let file = FileConfig::load(self.config_file.as_deref())?;

        let ctx = CommandContext {
            manager_url: self.manager_url.or(file.manager_url),
            auth_user: self
                .auth_user
                .or(file.auth_user)
                .unwrap_or_else(|| DEFAULT_AUTH_USER.to_string()),
            auth_pass: self.auth_pass.or(file.auth_pass).unwrap_or_default(),
            insecure: self.insecure || file.insecure.unwrap_or(false),
            defaults: file.node,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff_factor: backoff_factor(self.backoff_factor)?,
                ..Default::default()
            },
        };

        match self.command {
            Commands::Create(cmd) => cmd.run(ctx).await,
            Commands::Delete(cmd) => cmd.run(ctx).await,
            Commands::Bootstrap(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Convert `--backoff-factor` seconds into a duration.
fn backoff_factor(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow::anyhow!("invalid --backoff-factor {secs}: {e}"))
}

/// Per-node fields shared by flags, config file and JSON host entries.
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(default)]
pub struct NodeFields {
    /// The domain of the new node.
    #[arg(long)]
    pub domain: Option<String>,

    /// The private IP address of the node. Bootstrap is sent here.
    #[arg(long)]
    pub private_ip: Option<String>,

    /// The public (static NAT) IP address of the node.
    #[arg(long)]
    pub public_ip: Option<String>,

    /// The IP netmask of the new node. Default: '255.255.255.0'.
    #[arg(long)]
    pub netmask: Option<String>,

    /// The gateway IP for the new node.
    #[arg(long)]
    pub gateway: Option<String>,

    /// The password to use for the new node.
    #[arg(long, env = "PEXIP_TRANSCODER_PASSWORD", hide_env_values = true)]
    pub node_password: Option<String>,

    /// Subject name of the TLS certificate to apply to the node.
    #[arg(long)]
    pub tls_certificate_subject_name: Option<String>,

    /// Name of the system location the node belongs to.
    #[arg(long)]
    pub system_location_name: Option<String>,
}

impl NodeFields {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: &NodeFields) -> NodeFields {
        NodeFields {
            domain: self.domain.or_else(|| fallback.domain.clone()),
            private_ip: self.private_ip.or_else(|| fallback.private_ip.clone()),
            public_ip: self.public_ip.or_else(|| fallback.public_ip.clone()),
            netmask: self.netmask.or_else(|| fallback.netmask.clone()),
            gateway: self.gateway.or_else(|| fallback.gateway.clone()),
            node_password: self.node_password.or_else(|| fallback.node_password.clone()),
            tls_certificate_subject_name: self
                .tls_certificate_subject_name
                .or_else(|| fallback.tls_certificate_subject_name.clone()),
            system_location_name: self
                .system_location_name
                .or_else(|| fallback.system_location_name.clone()),
        }
    }
}

/// Shared command context: resolved connection settings and defaults.
pub struct CommandContext {
    pub manager_url: Option<String>,
    pub auth_user: String,
    pub auth_pass: String,
    pub insecure: bool,
    /// Node field values from the config file.
    pub defaults: NodeFields,
    pub retry: RetryPolicy,
}

impl CommandContext {
    /// Require a manager connection.
    pub fn connection(&self) -> Result<ManagerConnection> {
        let url = self.manager_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No manager URL specified. Use --manager-url or set MANAGER_URL in config.json."
            )
        })?;
        Ok(ManagerConnection::new(url, &self.auth_user, &self.auth_pass).insecure(self.insecure))
    }

    /// Build a provisioner for this invocation.
    pub fn provisioner(&self) -> Result<Provisioner> {
        let transport = TransportConfig {
            verify_tls: !self.insecure,
            timeout: None,
            retry: self.retry.clone(),
        };
        let bootstrap = BootstrapSettings {
            retry: self.retry.clone(),
            ..Default::default()
        };
        Ok(Provisioner::new(transport, bootstrap)?)
    }
}
