//! Command handlers.
//!
//! Every handler prints its result as JSON on stdout and returns whether the operation succeeded.

use crate::cli::Commands;
use color_eyre::eyre::WrapErr;
use color_eyre::{Result, Section};
use serde::Serialize;
use tracing::{debug, warn};

pub(crate) mod delete;
pub(crate) mod initialize;
pub(crate) mod list;
pub(crate) mod metadata;
pub(crate) mod reconfigure;
pub(crate) mod register;

/// Prints a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).wrap_err("Failed to serialize result")?;
    println!("{}", rendered);
    Ok(())
}

/// Checks that the container runtime executable can be found before a lifecycle command runs.
///
/// Provisioning commands need the runtime and fail early without it. `delete` only warns, its
/// teardown is best effort and the record is removed either way.
pub(crate) fn ensure_runtime(command: &Commands, runtime_cmd: &str) -> Result<()> {
    match which::which(runtime_cmd) {
        Ok(path) => {
            debug!("Using container runtime {}", path.display());
            Ok(())
        }
        Err(e) => match command {
            Commands::Delete { .. } => {
                warn!(
                    "Container runtime {} not found ({}), container teardown will fail and be ignored",
                    runtime_cmd, e
                );
                Ok(())
            }
            _ => Err::<(), _>(e)
                .wrap_err_with(|| format!("Container runtime {} not found", runtime_cmd))
                .suggestion("Install docker or set 'runtime_cmd' in the modterm config"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_RUNTIME: &str = "modterm-missing-runtime";

    #[test]
    fn test_missing_runtime_blocks_provisioning() {
        let initialize = Commands::Initialize {
            github_url: "https://x/y".to_string(),
            name: None,
            description: None,
            module_type: None,
            port: "8101".to_string(),
        };
        assert!(ensure_runtime(&initialize, MISSING_RUNTIME).is_err());

        let reconfigure = Commands::Reconfigure {
            id: "mod-1".to_string(),
            name: "demo".to_string(),
            port: "8101".to_string(),
        };
        assert!(ensure_runtime(&reconfigure, MISSING_RUNTIME).is_err());
    }

    #[test]
    fn test_missing_runtime_does_not_block_delete() -> Result<()> {
        let delete = Commands::Delete {
            id: "mod-1".to_string(),
        };
        ensure_runtime(&delete, MISSING_RUNTIME)
    }
}
