//! Read and catalog access to module records.
//!
//! Nothing here touches the container runtime. Direct registration catalogs a module that already
//! runs elsewhere and bypasses the lifecycle cycle.

use crate::endpoint::{ModuleEndpoint, ModuleMetadata};
use crate::errors::LifecycleError;
use crate::lifecycle::ModuleState;
use crate::locks::KeyedLocks;
use crate::store::Store;
use crate::store::sqlite_modules::{ModuleRecord, ModuleRecordBuilder, ModuleRecordBuilderError};
use crate::utils::ports::validate_port;
use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A module record as presented to readers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct ModuleView {
    #[serde(flatten)]
    pub(crate) module: ModuleRecord,
    pub(crate) state: ModuleState,
}

impl From<ModuleRecord> for ModuleView {
    fn from(record: ModuleRecord) -> Self {
        let state = ModuleState::of(&record);
        Self {
            module: record.presented(),
            state,
        }
    }
}

/// Catalog entry of a module managed outside of modterm.
#[derive(Clone, Debug, Default)]
pub(crate) struct RegisterRequest {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) service_url: String,
    pub(crate) description: Option<String>,
    pub(crate) github_url: Option<String>,
    pub(crate) module_type: Option<String>,
    pub(crate) port: Option<i64>,
    pub(crate) enabled: bool,
}

fn non_empty<S: AsRef<str>>(value: S) -> Option<String> {
    let trimmed = value.as_ref().trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug)]
pub(crate) struct Registry<S> {
    store: Arc<S>,
    locks: Arc<KeyedLocks>,
}

impl<S: Store> Registry<S> {
    pub(crate) fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Per-id lock table guarding writes. Lifecycle operations on the same store share it.
    pub(crate) fn locks(&self) -> Arc<KeyedLocks> {
        Arc::clone(&self.locks)
    }

    /// Returns every module, oldest first.
    pub(crate) async fn list(&self) -> Result<Vec<ModuleView>> {
        Ok(self
            .store
            .get_all_modules()
            .await?
            .into_iter()
            .map(ModuleView::from)
            .collect())
    }

    pub(crate) async fn get(&self, id: &str) -> Result<Option<ModuleView>> {
        Ok(self.store.get_module(id).await?.map(ModuleView::from))
    }

    /// Adds or replaces a catalog entry.
    ///
    /// An existing entry keeps its creation time and container name.
    ///
    /// # Errors
    /// Returns a validation error for an empty id, name or service URL and for an invalid port.
    #[instrument(skip(self))]
    pub(crate) async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<ModuleView, LifecycleError> {
        let port = request.port.map(validate_port).transpose()?;

        let mut builder = ModuleRecordBuilder::default();
        if let Some(id) = non_empty(&request.id) {
            builder.with_id(id);
        }
        if let Some(name) = non_empty(&request.name) {
            builder.with_name(name);
        }
        if let Some(service_url) = non_empty(&request.service_url) {
            builder.with_service_url(service_url);
        }
        builder
            .with_description(request.description.as_deref().and_then(non_empty))
            .with_github_url(request.github_url.as_deref().and_then(non_empty))
            .with_module_type(request.module_type.as_deref().and_then(non_empty))
            .with_port(port)
            .with_enabled(request.enabled);

        let mut record = builder.build().map_err(|e| match e {
            ModuleRecordBuilderError::UninitializedField(field) => {
                LifecycleError::MissingField(field)
            }
            ModuleRecordBuilderError::ValidationError(message) => LifecycleError::Store(message),
        })?;

        // A lifecycle cycle in flight on this id finishes first
        let _guard = self.locks.lock(&record.id).await;

        if let Some(existing) = self
            .store
            .get_module(&record.id)
            .await
            .map_err(LifecycleError::store)?
        {
            debug!("Updating existing catalog entry {}", existing.id);
            record.container_name = existing.container_name;
            record.created_at = existing.created_at;
        }

        self.store
            .upsert_module(&record)
            .await
            .map_err(LifecycleError::store)?;

        Ok(ModuleView::from(record))
    }

    /// Asks a module to describe itself.
    ///
    /// Returns `None` for an unknown id.
    #[instrument(skip(self, endpoint))]
    pub(crate) async fn fetch_metadata<E: ModuleEndpoint>(
        &self,
        id: &str,
        endpoint: &E,
    ) -> Result<Option<ModuleMetadata>> {
        match self.store.get_module(id).await? {
            Some(record) => Ok(Some(endpoint.get_metadata(&record.service_url).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::tests::FakeEndpoint;
    use crate::store::sqlite::tests::store_setup_helper;
    use color_eyre::eyre::eyre;
    use std::time::Duration;

    fn request(id: &str) -> RegisterRequest {
        RegisterRequest {
            id: id.to_string(),
            name: "Weather".to_string(),
            service_url: "http://weather.internal:9000".to_string(),
            description: Some("Forecasts".to_string()),
            enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_read() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let registry = Registry::new(Arc::new(store));

        let mut with_port = request("weather");
        with_port.port = Some(9000);
        let view = registry
            .register(with_port)
            .await
            .map_err(|e| eyre!("{}", e))?;
        assert!(view.module.enabled);
        assert_eq!(view.state, ModuleState::Enabled);
        assert_eq!(view.module.container_name(), "weather");

        let fetched = registry
            .get("weather")
            .await?
            .ok_or_else(|| eyre!("module missing"))?;
        assert_eq!(fetched, view);
        assert!(registry.get("unknown").await?.is_none());

        let json = serde_json::to_value(&fetched)?;
        assert_eq!(json["id"], "weather");
        assert_eq!(json["serviceUrl"], "http://weather.internal:9000");
        assert_eq!(json["state"], "enabled");
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_registration_is_listed_disabled() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let registry = Registry::new(Arc::new(store));

        registry
            .register(request("weather"))
            .await
            .map_err(|e| eyre!("{}", e))?;

        let all = registry.list().await?;
        assert_eq!(all.len(), 1);
        assert!(!all[0].module.enabled, "no port means pending");
        assert_eq!(all[0].state, ModuleState::Unconfigured);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_upserts_on_id() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let store = Arc::new(store);
        let registry = Registry::new(Arc::clone(&store));

        let first = registry
            .register(request("weather"))
            .await
            .map_err(|e| eyre!("{}", e))?;

        // A lifecycle cycle assigned a container name in the meantime
        let mut record = first.module.clone();
        record.container_name = Some("weather-container".to_string());
        store.upsert_module(&record).await?;

        let mut second = request("weather");
        second.name = "Weather v2".to_string();
        let second = registry
            .register(second)
            .await
            .map_err(|e| eyre!("{}", e))?;

        let all = registry.list().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].module.name, "Weather v2");
        assert_eq!(
            all[0].module.container_name.as_deref(),
            Some("weather-container")
        );
        assert_eq!(second.module.created_at, first.module.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_waits_for_lock() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let registry = Registry::new(Arc::new(store));

        let guard = registry.locks().lock("weather").await;
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            registry.register(request("weather")),
        )
        .await;
        assert!(blocked.is_err(), "register must wait for the id lock");
        assert!(registry.list().await?.is_empty());

        drop(guard);
        registry
            .register(request("weather"))
            .await
            .map_err(|e| eyre!("{}", e))?;
        assert_eq!(registry.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_register_validation() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let registry = Registry::new(Arc::new(store));

        let err = registry.register(request(" ")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MissingField("id")));

        let mut no_url = request("weather");
        no_url.service_url = String::new();
        let err = registry.register(no_url).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MissingField("service_url")));

        let mut bad_port = request("weather");
        bad_port.port = Some(70000);
        let err = registry.register(bad_port).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidPort(_)));

        assert!(registry.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_metadata() -> Result<()> {
        let (_temp_dir, store) = store_setup_helper().await?;
        let registry = Registry::new(Arc::new(store));
        registry
            .register(request("weather"))
            .await
            .map_err(|e| eyre!("{}", e))?;

        let metadata = registry
            .fetch_metadata("weather", &FakeEndpoint::default())
            .await?
            .ok_or_else(|| eyre!("metadata missing"))?;
        assert_eq!(metadata.name, "fake");

        assert!(
            registry
                .fetch_metadata("unknown", &FakeEndpoint::default())
                .await?
                .is_none()
        );
        assert!(
            registry
                .fetch_metadata("weather", &FakeEndpoint::never_succeeding())
                .await
                .is_err()
        );
        Ok(())
    }
}
