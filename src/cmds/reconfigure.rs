use crate::cmds::print_json;
use crate::configuration::Sleeper;
use crate::endpoint::ModuleEndpoint;
use crate::lifecycle::Orchestrator;
use crate::oplog::{OperationLog, OperationOutcome, Step};
use crate::runtime::ContainerRuntime;
use crate::store::Store;
use crate::store::sqlite_modules::ModuleRecord;
use crate::utils::ports::{PortProbe, parse_port};
use color_eyre::Result;

/// Re-provisions a known module.
pub(crate) async fn reconfigure<S, R, E, Z, P>(
    orchestrator: &Orchestrator<S, R, E, Z, P>,
    id: String,
    name: String,
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
        Ok(port) => orchestrator.reconfigure(&id, &name, port).await,
        Err(e) => {
            let mut log = OperationLog::new();
            log.error(Step::Validate, e.to_string());
            OperationOutcome::<ModuleRecord>::new(Err(e), log)
        }
    };

    print_json(&outcome)?;
    Ok(outcome.is_ok())
}
