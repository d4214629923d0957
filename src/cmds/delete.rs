use crate::cmds::print_json;
use crate::configuration::Sleeper;
use crate::endpoint::ModuleEndpoint;
use crate::lifecycle::Orchestrator;
use crate::runtime::ContainerRuntime;
use crate::store::Store;
use crate::utils::ports::PortProbe;
use color_eyre::Result;

/// Tears down a module and forgets it. Unknown ids succeed.
pub(crate) async fn delete<S, R, E, Z, P>(
    orchestrator: &Orchestrator<S, R, E, Z, P>,
    id: String,
) -> Result<bool>
where
    S: Store,
    R: ContainerRuntime,
    E: ModuleEndpoint,
    Z: Sleeper,
    P: PortProbe,
{
    let outcome = orchestrator.delete(&id).await;
    print_json(&outcome)?;
    Ok(outcome.is_ok())
}
