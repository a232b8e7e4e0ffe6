//! Error display for the CLI.

use pexnode_provision::ProvisionError;

use crate::output::print_failure;

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    let hint = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .and_then(ProvisionError::hint);

    print_failure(&format!("{err:#}"), hint);
}
