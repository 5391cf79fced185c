//! Helpers shared by the importer binaries

use crate::error::ImportError;
use crate::import::{ImportOutcome, ImportReport};
use std::ffi::OsString;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info};

/// Parse a positional argument, naming it in the error
pub fn parse_arg<T>(name: &str, value: &str) -> Result<T, ImportError>
where
    T: FromStr<Err = ImportError>,
{
    value.parse().map_err(|e| match e {
        ImportError::Parse(msg) => ImportError::Parse(format!("<{}>: {}", name, msg)),
        other => other,
    })
}

/// Accept single-dash long flags (`-superpixels`, `-help`) as spelled by
/// older scripts, rewriting them to `--name` for clap.
///
/// Only names in `long` are touched, and nothing after a bare `--`.
pub fn single_dash_long_flags<I>(args: I, long: &[&str]) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut literal = false;
    args.into_iter()
        .map(|arg| {
            if literal {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                literal = true;
                return arg;
            }
            let name = text
                .strip_prefix('-')
                .filter(|rest| !rest.starts_with('-'))
                .map(|rest| rest.split_once('=').map_or(rest, |(n, _)| n));
            if matches!(name, Some(n) if long.contains(&n)) {
                OsString::from(format!("-{}", text))
            } else {
                arg
            }
        })
        .collect()
}

/// Map a finished run to the process exit code, logging fatal errors.
///
/// An interrupted run still counts as success.
pub fn exit_code(result: anyhow::Result<ImportReport>) -> ExitCode {
    match result {
        Ok(report) => {
            if report.outcome == ImportOutcome::Interrupted {
                info!("Import stopped by interrupt; server was shut down");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
