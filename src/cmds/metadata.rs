use crate::cmds::print_json;
use crate::endpoint::ModuleEndpoint;
use crate::errors::LifecycleError;
use crate::oplog::{OperationLog, OperationOutcome};
use crate::registry::Registry;
use crate::store::Store;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;

/// Prints what a module reports about itself.
pub(crate) async fn metadata<S: Store, E: ModuleEndpoint>(
    registry: &Registry<S>,
    endpoint: &E,
    id: String,
) -> Result<bool> {
    let metadata = registry
        .fetch_metadata(&id, endpoint)
        .await
        .wrap_err_with(|| format!("Failed to fetch metadata of module {}", id))?;

    let outcome = OperationOutcome::new(
        metadata.ok_or(LifecycleError::NotFound(id)),
        OperationLog::new(),
    );
    print_json(&outcome)?;
    Ok(outcome.is_ok())
}
