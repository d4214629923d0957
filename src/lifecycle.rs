//! Module lifecycle orchestration.
//!
//! Every lifecycle operation runs the same ordered cycle:
//!
//! 1. write the record as pending (`enabled = false`)
//! 2. remove a leftover container
//! 3. start the container
//! 4. run the configuration handshake
//! 5. flip the record to enabled
//!
//! No step starts before its predecessor succeeded. A failure leaves the record disabled and the
//! operation reports the error together with everything logged up to that point. Operations on the
//! same module id never overlap.

use crate::configuration::{ConfigurationClient, Sleeper};
use crate::endpoint::ModuleEndpoint;
use crate::errors::{ErrorKind, LifecycleError};
use crate::locks::KeyedLocks;
use crate::oplog::{OperationLog, OperationOutcome, Step};
use crate::runtime::{ContainerDriver, ContainerRuntime};
use crate::store::Store;
use crate::store::sqlite_modules::{ModuleRecord, service_url_for};
use crate::utils::names::{is_valid_container_name, new_module_id, repository_name, slugify};
use crate::utils::ports::{PortProbe, validate_port};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument};

// -------------------------------------------------------------------------------------------------
// Module state
// -------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ModuleState {
    /// Never provisioned, no port yet
    Unconfigured,
    /// Record written as pending, container being (re)started
    Provisioning,
    /// Container started, handshake running
    AwaitingConfiguration,
    Enabled,
    Disabled,
}

impl ModuleState {
    /// Derives the state of a stored record.
    pub(crate) fn of(record: &ModuleRecord) -> Self {
        if record.is_pending() {
            ModuleState::Unconfigured
        } else if record.enabled {
            ModuleState::Enabled
        } else {
            ModuleState::Disabled
        }
    }

    /// Returns `true` if `next` directly follows `self`.
    pub(crate) fn can_transition(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Unconfigured | Enabled | Disabled, Provisioning)
                | (Provisioning, AwaitingConfiguration)
                | (AwaitingConfiguration, Enabled)
                | (Unconfigured | Provisioning | AwaitingConfiguration, Disabled)
        )
    }

    fn advance(&mut self, next: ModuleState) {
        debug_assert!(
            self.can_transition(next),
            "invalid transition {:?} -> {:?}",
            self,
            next
        );
        debug!("Module state {:?} -> {:?}", self, next);
        *self = next;
    }
}

// -------------------------------------------------------------------------------------------------
// Requests and results
// -------------------------------------------------------------------------------------------------

/// Provisioning request for a module not known yet.
#[derive(Clone, Debug, Default)]
pub(crate) struct InitializeRequest {
    pub(crate) github_url: String,
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) module_type: Option<String>,
    /// Requested host port, validated before anything else happens
    pub(crate) port: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct Deleted {
    pub(crate) id: String,
    /// Whether a record existed before the deletion
    pub(crate) existed: bool,
}

/// Candidate ids tried before `initialize` gives up.
const MAX_ID_ATTEMPTS: u32 = 16;

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// -------------------------------------------------------------------------------------------------
// Orchestrator
// -------------------------------------------------------------------------------------------------

pub(crate) struct Orchestrator<S, R, E, Z, P> {
    store: Arc<S>,
    driver: ContainerDriver<R>,
    configuration: ConfigurationClient<E, Z>,
    probe: P,
    locks: Arc<KeyedLocks>,
}

impl<S, R, E, Z, P> Orchestrator<S, R, E, Z, P>
where
    S: Store,
    R: ContainerRuntime,
    E: ModuleEndpoint,
    Z: Sleeper,
    P: PortProbe,
{
    pub(crate) fn new(
        store: Arc<S>,
        driver: ContainerDriver<R>,
        configuration: ConfigurationClient<E, Z>,
        probe: P,
    ) -> Self {
        Self {
            store,
            driver,
            configuration,
            probe,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Shares the per-id lock table with other writers of the same store.
    pub(crate) fn with_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Registers and provisions a brand-new module.
    ///
    /// The module gets a fresh id derived from its name (or repository name), which also names its
    /// container.
    #[instrument(skip(self))]
    pub(crate) async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> OperationOutcome<ModuleRecord> {
        let mut log = OperationLog::new();
        let result = self.try_initialize(request, &mut log).await;
        finish(result, log)
    }

    async fn try_initialize(
        &self,
        request: InitializeRequest,
        log: &mut OperationLog,
    ) -> Result<ModuleRecord, LifecycleError> {
        let github_url = request.github_url.trim().to_string();
        if github_url.is_empty() {
            return Err(LifecycleError::MissingField("githubUrl"));
        }
        let port = validate_port(request.port)?;
        self.ensure_available(port, log)?;

        let name = non_empty(request.name);
        let (id, _guard) = self
            .reserve_id(|attempt| new_module_id(name.as_deref(), &github_url, attempt))
            .await?;

        let now = Utc::now();
        let record = ModuleRecord {
            name: name
                .or_else(|| repository_name(&github_url))
                .unwrap_or_else(|| id.clone()),
            description: non_empty(request.description),
            github_url: Some(github_url),
            module_type: non_empty(request.module_type),
            service_url: service_url_for(&id),
            container_name: Some(id.clone()),
            port: Some(port),
            enabled: false,
            created_at: now,
            updated_at: now,
            id,
        };
        log.info(
            Step::Validate,
            format!("Assigned id {} to the new module", record.id),
        );

        self.run_cycle(record, log).await
    }

    /// Picks the first candidate id not stored yet and holds its lock.
    ///
    /// The lookup happens under the lock, so an id claimed by a cycle still in flight is seen as
    /// taken once that cycle wrote its pending record.
    async fn reserve_id<F>(
        &self,
        candidate: F,
    ) -> Result<(String, OwnedMutexGuard<()>), LifecycleError>
    where
        F: Fn(u32) -> String,
    {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = candidate(attempt);
            let guard = self.locks.lock(&id).await;
            let taken = self
                .store
                .get_module(&id)
                .await
                .map_err(LifecycleError::store)?
                .is_some();
            if !taken {
                return Ok((id, guard));
            }
            debug!("Module id {} is taken, picking another", id);
        }
        Err(LifecycleError::Store(format!(
            "no free module id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    /// Re-provisions a known module under a (possibly) new name and port.
    ///
    /// The container is always restarted, even if nothing changed.
    #[instrument(skip(self))]
    pub(crate) async fn reconfigure(
        &self,
        id: &str,
        name: &str,
        port: i64,
    ) -> OperationOutcome<ModuleRecord> {
        let mut log = OperationLog::new();
        let result = self.try_reconfigure(id, name, port, &mut log).await;
        finish(result, log)
    }

    async fn try_reconfigure(
        &self,
        id: &str,
        name: &str,
        port: i64,
        log: &mut OperationLog,
    ) -> Result<ModuleRecord, LifecycleError> {
        let port = validate_port(port)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LifecycleError::MissingField("name"));
        }

        let _guard = self.locks.lock(id).await;

        let mut record = self
            .store
            .get_module(id)
            .await
            .map_err(LifecycleError::store)?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        if record.port == Some(port) {
            log.info(
                Step::Validate,
                format!("Port {} is already assigned to {}", port, id),
            );
        } else {
            self.ensure_available(port, log)?;
        }

        // The container name is derived once and kept for the lifetime of the module
        let container_name = record
            .container_name
            .clone()
            .unwrap_or_else(|| slugify(&record.id));
        record.service_url = service_url_for(&container_name);
        record.container_name = Some(container_name);
        record.name = name.to_string();
        record.port = Some(port);

        self.run_cycle(record, log).await
    }

    /// Tears down a module's container and removes its record.
    ///
    /// Runtime errors are ignored. Deleting an unknown id succeeds.
    #[instrument(skip(self))]
    pub(crate) async fn delete(&self, id: &str) -> OperationOutcome<Deleted> {
        let mut log = OperationLog::new();
        let result = self.try_delete(id, &mut log).await;
        finish(result, log)
    }

    async fn try_delete(
        &self,
        id: &str,
        log: &mut OperationLog,
    ) -> Result<Deleted, LifecycleError> {
        let _guard = self.locks.lock(id).await;

        let existing = self
            .store
            .get_module(id)
            .await
            .map_err(LifecycleError::store)?;

        // Containers of unknown ids were never ours to stop
        match &existing {
            Some(record) if is_valid_container_name(record.container_name()) => {
                self.driver.teardown(record.container_name(), log).await
            }
            Some(record) => log.warn(
                Step::Teardown,
                format!(
                    "Container name {:?} is not valid, nothing to tear down",
                    record.container_name()
                ),
            ),
            None => log.info(
                Step::Teardown,
                format!("Module {} is not registered, nothing to tear down", id),
            ),
        }

        self.store
            .remove_module(id)
            .await
            .map_err(LifecycleError::store)?;

        if existing.is_some() {
            log.info(Step::Delete, format!("Removed module {}", id));
        } else {
            log.info(Step::Delete, format!("Module {} was not registered", id));
        }

        Ok(Deleted {
            id: id.to_string(),
            existed: existing.is_some(),
        })
    }

    fn ensure_available(&self, port: u16, log: &mut OperationLog) -> Result<(), LifecycleError> {
        if !self.probe.is_available(port) {
            return Err(LifecycleError::PortInUse(port));
        }
        log.info(Step::Validate, format!("Port {} is available", port));
        Ok(())
    }

    /// Runs the provisioning cycle for a validated record carrying its target port.
    async fn run_cycle(
        &self,
        mut record: ModuleRecord,
        log: &mut OperationLog,
    ) -> Result<ModuleRecord, LifecycleError> {
        let port = record.port.ok_or(LifecycleError::MissingField("port"))?;
        let mut state = ModuleState::of(&record);
        // A record about to be provisioned is never stored as enabled
        if state == ModuleState::Enabled {
            state = ModuleState::Disabled;
        }

        // --
        // * Pending record
        record.enabled = false;
        record.touch();
        self.store
            .upsert_module(&record)
            .await
            .map_err(LifecycleError::store)?;
        state.advance(ModuleState::Provisioning);
        log.info(
            Step::Persist,
            format!(
                "Recorded module {} as pending on port {} ({})",
                record.id, port, record.service_url
            ),
        );

        // --
        // * Container
        let container = record.container_name().to_string();
        self.driver.remove_if_exists(&container, log).await;
        if let Err(e) = self.driver.start(&container, port, log).await {
            state.advance(ModuleState::Disabled);
            log.warn(Step::Start, format!("Module {} left disabled", record.id));
            return Err(e);
        }
        state.advance(ModuleState::AwaitingConfiguration);

        // --
        // * Handshake
        if let Err(e) = self
            .configuration
            .configure(&record.service_url, &record.id, &record.name, port, log)
            .await
        {
            state.advance(ModuleState::Disabled);
            log.error(Step::Configure, e.to_string());
            log.warn(
                Step::Configure,
                format!(
                    "Module {} left disabled, container {} keeps running",
                    record.id, container
                ),
            );
            return Err(e);
        }

        // --
        // * Enable
        record.enabled = true;
        record.touch();
        self.store
            .upsert_module(&record)
            .await
            .map_err(LifecycleError::store)?;
        state.advance(ModuleState::Enabled);
        log.info(Step::Enable, format!("Module {} is enabled", record.id));

        Ok(record)
    }
}

/// Wraps an operation result, logging errors not logged where they occurred.
fn finish<T>(result: Result<T, LifecycleError>, mut log: OperationLog) -> OperationOutcome<T> {
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Validation | ErrorKind::NotFound => log.error(Step::Validate, e.to_string()),
            ErrorKind::Store => log.error(Step::Persist, e.to_string()),
            ErrorKind::Runtime | ErrorKind::Handshake => {}
        }
    }
    OperationOutcome::new(result, log)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
