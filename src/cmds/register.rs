use crate::cmds::print_json;
use crate::oplog::{OperationLog, OperationOutcome, Step};
use crate::registry::{ModuleView, RegisterRequest, Registry};
use crate::store::Store;
use crate::utils::ports::parse_port;
use color_eyre::Result;

/// Catalogs a module without provisioning it.
///
/// `port` is taken as given on the command line.
pub(crate) async fn register<S: Store>(
    registry: &Registry<S>,
    mut request: RegisterRequest,
    port: Option<String>,
) -> Result<bool> {
    let mut log = OperationLog::new();
    let result = match port.as_deref().map(parse_port).transpose() {
        Ok(port) => {
            request.port = port;
            registry.register(request).await
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(view) => log.info(Step::Persist, format!("Registered module {}", view.module.id)),
        Err(e) => log.error(Step::Validate, e.to_string()),
    }

    let outcome: OperationOutcome<ModuleView> = OperationOutcome::new(result, log);
    print_json(&outcome)?;
    Ok(outcome.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::tests::store_setup_helper;
    use std::sync::Arc;

    fn request() -> RegisterRequest {
        RegisterRequest {
            id: "weather".to_string(),
            name: "Weather".to_string(),
            service_url: "http://weather:9000".to_string(),
            enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_command() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let store = Arc::new(store);
        let registry = Registry::new(Arc::clone(&store));

        assert!(!register(&registry, request(), Some("port".to_string())).await?);
        assert!(store.get_module("weather").await?.is_none());

        assert!(register(&registry, request(), Some(" 9000 ".to_string())).await?);
        let stored = store.get_module("weather").await?;
        assert_eq!(stored.and_then(|m| m.port), Some(9000));
        Ok(())
    }
}
