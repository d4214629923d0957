use crate::cmds::print_json;
use crate::configuration::Sleeper;
use crate::endpoint::ModuleEndpoint;
use crate::lifecycle::{InitializeRequest, Orchestrator};
use crate::oplog::{OperationLog, OperationOutcome, Step};
use crate::runtime::ContainerRuntime;
use crate::store::Store;
use crate::store::sqlite_modules::ModuleRecord;
use crate::utils::ports::{PortProbe, parse_port};
use color_eyre::Result;

/// Provisions a new module.
///
/// * `port` - Requested host port as given on the command line
pub(crate) async fn initialize<S, R, E, Z, P>(
    orchestrator: &Orchestrator<S, R, E, Z, P>,
    github_url: String,
    name: Option<String>,
    description: Option<String>,
    module_type: Option<String>,
    port: String,
) -> Result<bool>
where
    S: Store,
    R: ContainerRuntime,
    E: ModuleEndpoint,
    Z: Sleeper,
    P: PortProbe,
{
    let outcome = match parse_port(&port) {
        Ok(port) => {
            orchestrator
                .initialize(InitializeRequest {
                    github_url,
                    name,
                    description,
                    module_type,
                    port,
                })
                .await
        }
        Err(e) => {
            let mut log = OperationLog::new();
            log.error(Step::Validate, e.to_string());
            OperationOutcome::<ModuleRecord>::new(Err(e), log)
        }
    };

    print_json(&outcome)?;
    Ok(outcome.is_ok())
}
