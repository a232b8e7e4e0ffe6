//! Provisioning errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while provisioning a single node.
///
/// "Already exists" is deliberately absent: it is a terminal
/// [`Outcome`](crate::Outcome), not a failure.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required node field was absent or empty. No network call was made.
    #[error("argument --{} is required to create a node", .field.replace('_', "-"))]
    MissingArgument { field: &'static str },

    /// A named dependency object has no match on the management API.
    #[error("{kind} with name '{name}' was unable to be found")]
    ReferenceNotFound { kind: &'static str, name: String },

    /// The management API rejected the node creation document.
    #[error("node registration failed with status {status}: {body}")]
    RegistrationFailed { status: u16, body: String },

    /// A non-success response from a read or delete call.
    #[error("management API returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport failure after the retry budget was spent.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The management API answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built (bad URL, bad credentials encoding).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing a stored bootstrap payload failed.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RegistrationFailed { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// A short operator hint for the error, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            _ if self.status() == Some(401) => Some("Are auth_user and auth_pass set correctly?"),
            _ if self.status() == Some(403) => {
                Some("The configured user may not have permission for this operation.")
            }
            Self::Network(_) => Some("Check your network connection and the manager URL."),
            Self::ReferenceNotFound { .. } => {
                Some("Check the name against the objects configured on the manager.")
            }
            _ => None,
        }
    }
}
