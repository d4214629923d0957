use crate::cmds::print_json;
use crate::errors::LifecycleError;
use crate::oplog::{OperationLog, OperationOutcome};
use crate::registry::Registry;
use crate::store::Store;
use color_eyre::Result;
use serde_json::json;

/// Prints every registered module.
pub(crate) async fn list<S: Store>(registry: &Registry<S>) -> Result<bool> {
    let modules = registry.list().await?;
    print_json(&json!({ "ok": true, "modules": modules }))?;
    Ok(true)
}

/// Prints a single module, or a not-found result.
pub(crate) async fn get<S: Store>(registry: &Registry<S>, id: String) -> Result<bool> {
    let result = registry
        .get(&id)
        .await?
        .ok_or(LifecycleError::NotFound(id));
    let outcome = OperationOutcome::new(result, OperationLog::new());
    print_json(&outcome)?;
    Ok(outcome.is_ok())
}
