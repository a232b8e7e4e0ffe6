//! Output formatting for CLI commands.

use colored::Colorize;
use pexnode_provision::{BootstrapOutcome, BootstrapReport, NodeReport, Outcome};

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a failure message, with a hint when one applies.
pub fn print_failure(message: &str, hint: Option<&str>) {
    eprintln!("{} {}", "Error:".red().bold(), message);
    if let Some(hint) = hint {
        eprintln!("{}", format!("Hint: {hint}").yellow());
    }
}

/// Print one line per node.
pub fn print_reports(reports: &[NodeReport]) {
    for report in reports {
        let line = format!("{}: {}", report.hostname, report.outcome);
        match &report.outcome {
            Outcome::Created(_) | Outcome::Removed => print_success(&line),
            Outcome::AlreadyExists | Outcome::NotFound => print_info(&line),
            Outcome::RegisteredButBootstrapFailed(bootstrap) => {
                let hint = match &bootstrap.recovery_file {
                    Some(path) => Some(format!(
                        "Retry with `pexnode bootstrap --xml-file {} --node-address <address>`",
                        path.display()
                    )),
                    None if bootstrap.recovery_error.is_some() => Some(format!(
                        "Run `pexnode delete {}` and create the node again",
                        report.hostname
                    )),
                    None => None,
                };
                print_failure(&line, hint.as_deref());
            }
            Outcome::Failed(err) => print_failure(&line, err.hint()),
        }
    }

    if reports.len() > 1 {
        let failed = reports.iter().filter(|r| r.outcome.is_failure()).count();
        print_info(&format!(
            "{} node(s) processed, {} failed",
            reports.len(),
            failed
        ));
    }
}

/// Print the result of a standalone bootstrap.
pub fn print_bootstrap_report(report: &BootstrapReport) {
    match &report.outcome {
        BootstrapOutcome::Success { status } => print_success(&format!(
            "{}: bootstrapped with status {} in {:.1?}",
            report.hostname, status, report.elapsed
        )),
        BootstrapOutcome::Failed(reason) => print_failure(
            &format!(
                "{}: bootstrap failed after {:.1?} ({reason})",
                report.hostname, report.elapsed
            ),
            None,
        ),
    }
}
