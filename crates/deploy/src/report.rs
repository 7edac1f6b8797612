//! Rendering of deployment results and exit-code mapping.
//!
//! The reporter only writes; deciding when the process exits is left to the
//! caller.

use std::io::{self, Write};

use crate::{DeploymentResult, DeploymentStatus};

/// Output formats for a deployment result.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    /// Address alone on stdout, diagnostics on stderr.
    #[default]
    Text,
    /// The full result as one JSON document on stdout.
    Json,
}

/// Process exit status for each terminal state.
pub fn exit_code(status: DeploymentStatus) -> i32 {
    match status {
        DeploymentStatus::Succeeded => 0,
        DeploymentStatus::Failed => 1,
        DeploymentStatus::TimedOut => 2,
        DeploymentStatus::Cancelled => 3,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Write `result` to stdout/stderr and return the exit code.
    pub fn report(&self, result: &DeploymentResult) -> i32 {
        let stdout = io::stdout();
        let stderr = io::stderr();
        self.report_to(result, &mut stdout.lock(), &mut stderr.lock())
    }

    /// Write `result` to the given primary and diagnostic channels.
    ///
    /// Write failures are ignored: the exit code still reflects the result.
    pub fn report_to(
        &self,
        result: &DeploymentResult,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> i32 {
        if let Err(e) = self.write(result, out, err) {
            tracing::debug!(error = %e, "Failed to write deployment result");
        }
        exit_code(result.status)
    }

    fn write(
        &self,
        result: &DeploymentResult,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            let json = serde_json::to_string(result).map_err(io::Error::other)?;
            writeln!(out, "{}", json)?;
        }

        match (&result.contract_address, &result.error) {
            (Some(address), _) if result.is_success() => {
                if self.format == OutputFormat::Text {
                    writeln!(out, "{}", address)?;
                }
            }
            (_, Some(detail)) => {
                write!(err, "error[{}]: {}", detail.kind, detail.message)?;
                if let Some(hash) = &result.transaction_hash {
                    write!(err, " (network: {}, tx: {})", result.network, hash)?;
                } else {
                    write!(err, " (network: {})", result.network)?;
                }
                writeln!(err)?;
            }
            _ => {
                writeln!(err, "error[{}]: deployment did not succeed", result.status)?;
            }
        }

        out.flush()?;
        err.flush()
    }
}
