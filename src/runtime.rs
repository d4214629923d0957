//! Container runtime access.
//!
//! [`ContainerRuntime`] is the typed boundary to the runtime: every call takes structured,
//! validated arguments and is handed to the runtime binary without a shell. [`ContainerDriver`]
//! builds the idempotent provisioning steps of a module on top of it.

use crate::errors::LifecycleError;
use crate::logs::log_output;
use crate::oplog::{OperationLog, Step};
use crate::store::sqlite_modules::MODULE_INTERNAL_PORT;
use crate::utils::commands::exec_output;
use crate::utils::names::is_valid_container_name;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// -------------------------------------------------------------------------------------------------
// Runtime interface
// -------------------------------------------------------------------------------------------------

/// Arguments of a container start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RunSpec {
    pub(crate) name: String,
    pub(crate) image: String,
    pub(crate) host_port: u16,
    pub(crate) container_port: u16,
    pub(crate) network: String,
}

impl RunSpec {
    /// Rejects arguments the runtime must never see.
    pub(crate) fn validate(&self) -> Result<()> {
        if !is_valid_container_name(&self.name) {
            return Err(eyre!("Invalid container name {:?}", self.name));
        }
        if self.image.trim().is_empty() || self.image.starts_with('-') {
            return Err(eyre!("Invalid image {:?}", self.image));
        }
        if self.network.trim().is_empty() || self.network.starts_with('-') {
            return Err(eyre!("Invalid network {:?}", self.network));
        }
        if self.host_port == 0 || self.container_port == 0 {
            return Err(eyre!("Ports must not be 0"));
        }
        Ok(())
    }
}

pub(crate) trait ContainerRuntime {
    /// Stops a running container.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Removes a container, killing it first if `force` is set.
    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// Starts a detached container.
    async fn run(&self, spec: &RunSpec) -> Result<()>;
}

impl<T: ContainerRuntime> ContainerRuntime for Arc<T> {
    async fn stop(&self, name: &str) -> Result<()> {
        self.as_ref().stop(name).await
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        self.as_ref().remove(name, force).await
    }

    async fn run(&self, spec: &RunSpec) -> Result<()> {
        self.as_ref().run(spec).await
    }
}

// -------------------------------------------------------------------------------------------------
// Docker compatible CLI runtime
// -------------------------------------------------------------------------------------------------

/// Runtime driven through a docker compatible command line (`docker`, `podman`).
#[derive(Clone, Debug)]
pub(crate) struct DockerCli {
    /// Runtime executable
    cmd: String,
    /// Upper bound for every single call
    timeout: Duration,
}

impl DockerCli {
    pub(crate) fn new<S: Into<String>>(cmd: S, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    /// Command line arguments of a container start.
    fn run_args(spec: &RunSpec) -> Vec<String> {
        vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--publish".to_string(),
            format!("{}:{}", spec.host_port, spec.container_port),
            "--network".to_string(),
            spec.network.clone(),
            spec.image.clone(),
        ]
    }

    async fn exec(&self, args: Vec<String>) -> Result<()> {
        let full_cmd = format!("{} {}", self.cmd, args.join(" "));
        debug!("Executing {}", full_cmd);

        let output = exec_output(self.cmd.as_str(), args.iter().map(String::as_str), self.timeout)
            .await?;

        log_output!(output.stdout, "Stdout", full_cmd, debug);
        log_output!(output.stderr, "Stderr", full_cmd, debug);

        if output.status.success() {
            Ok(())
        } else {
            Err(eyre!(
                "{} exited with code {}: {}",
                full_cmd,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

impl ContainerRuntime for DockerCli {
    async fn stop(&self, name: &str) -> Result<()> {
        if !is_valid_container_name(name) {
            return Err(eyre!("Invalid container name {:?}", name));
        }
        self.exec(vec!["stop".to_string(), name.to_string()]).await
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        if !is_valid_container_name(name) {
            return Err(eyre!("Invalid container name {:?}", name));
        }
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(name.to_string());
        self.exec(args).await
    }

    async fn run(&self, spec: &RunSpec) -> Result<()> {
        spec.validate()?;
        self.exec(Self::run_args(spec))
            .await
            .wrap_err_with(|| format!("Failed to start container {}", spec.name))
    }
}

// -------------------------------------------------------------------------------------------------
// Container driver
// -------------------------------------------------------------------------------------------------

/// Provisioning steps for module containers.
///
/// Every module container runs the same image on the same network; only name and host port vary.
#[derive(Debug)]
pub(crate) struct ContainerDriver<R> {
    runtime: R,
    image: String,
    network: String,
}

impl<R: ContainerRuntime> ContainerDriver<R> {
    pub(crate) fn new<S: Into<String>>(runtime: R, image: S, network: S) -> Self {
        Self {
            runtime,
            image: image.into(),
            network: network.into(),
        }
    }

    /// Force-removes a container if it exists.
    ///
    /// Never fails: a missing container and every other removal error are only logged, so this
    /// is always safe to call before a fresh start.
    #[instrument(skip(self, log))]
    pub(crate) async fn remove_if_exists(&self, name: &str, log: &mut OperationLog) {
        match self.runtime.remove(name, true).await {
            Ok(()) => log.info(Step::Remove, format!("Removed existing container {}", name)),
            Err(e) => log.info(
                Step::Remove,
                format!("No container {} removed: {:#}", name, e),
            ),
        }
    }

    /// Starts the module container publishing `host_port` to the module's internal port.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Runtime`] if the runtime rejects the start.
    #[instrument(skip(self, log))]
    pub(crate) async fn start(
        &self,
        name: &str,
        host_port: u16,
        log: &mut OperationLog,
    ) -> Result<(), LifecycleError> {
        let spec = RunSpec {
            name: name.to_string(),
            image: self.image.clone(),
            host_port,
            container_port: MODULE_INTERNAL_PORT,
            network: self.network.clone(),
        };

        match self.runtime.run(&spec).await {
            Ok(()) => {
                log.info(
                    Step::Start,
                    format!(
                        "Started container {} from {} on network {}, port {} -> {}",
                        name, self.image, self.network, host_port, MODULE_INTERNAL_PORT
                    ),
                );
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                log.error(
                    Step::Start,
                    format!("Failed to start container {}: {}", name, message),
                );
                Err(LifecycleError::Runtime {
                    container: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Stops and removes a container, ignoring every runtime error.
    #[instrument(skip(self, log))]
    pub(crate) async fn teardown(&self, name: &str, log: &mut OperationLog) {
        match self.runtime.stop(name).await {
            Ok(()) => log.info(Step::Teardown, format!("Stopped container {}", name)),
            Err(e) => log.warn(
                Step::Teardown,
                format!("Ignoring failure to stop container {}: {:#}", name, e),
            ),
        }
        match self.runtime.remove(name, true).await {
            Ok(()) => log.info(Step::Teardown, format!("Removed container {}", name)),
            Err(e) => log.warn(
                Step::Teardown,
                format!("Ignoring failure to remove container {}: {:#}", name, e),
            ),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oplog::Severity;
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::Mutex;

    /// Runtime call recorded by [`FakeRuntime`].
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum RuntimeCall {
        Stop(String),
        Remove(String, bool),
        Run(RunSpec),
    }

    /// In-memory runtime that records calls and fails on request.
    ///
    /// With `publish` set, a started container holds its host port until it is removed.
    #[derive(Debug, Default)]
    pub(crate) struct FakeRuntime {
        pub(crate) calls: Mutex<Vec<RuntimeCall>>,
        pub(crate) fail_stop: bool,
        pub(crate) fail_remove: bool,
        pub(crate) fail_run: bool,
        pub(crate) publish: bool,
        pub(crate) published: Mutex<HashMap<String, TcpListener>>,
    }

    impl FakeRuntime {
        pub(crate) fn calls(&self) -> Vec<RuntimeCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(&self, call: RuntimeCall) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }

        fn unpublish(&self, name: &str) {
            if let Ok(mut published) = self.published.lock() {
                published.remove(name);
            }
        }
    }

    impl ContainerRuntime for FakeRuntime {
        async fn stop(&self, name: &str) -> Result<()> {
            self.record(RuntimeCall::Stop(name.to_string()));
            if self.fail_stop {
                return Err(eyre!("Error response from daemon: No such container: {}", name));
            }
            Ok(())
        }

        async fn remove(&self, name: &str, force: bool) -> Result<()> {
            self.record(RuntimeCall::Remove(name.to_string(), force));
            self.unpublish(name);
            if self.fail_remove {
                return Err(eyre!("Error response from daemon: No such container: {}", name));
            }
            Ok(())
        }

        async fn run(&self, spec: &RunSpec) -> Result<()> {
            spec.validate()?;
            self.record(RuntimeCall::Run(spec.clone()));
            if self.fail_run {
                return Err(eyre!(
                    "Error response from daemon: Conflict. The container name is already in use"
                ));
            }
            if self.publish {
                let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, spec.host_port))?;
                if let Ok(mut published) = self.published.lock() {
                    published.insert(spec.name.clone(), listener);
                }
            }
            Ok(())
        }
    }

    fn spec(name: &str) -> RunSpec {
        RunSpec {
            name: name.to_string(),
            image: "modterm-module:latest".to_string(),
            host_port: 8101,
            container_port: MODULE_INTERNAL_PORT,
            network: "modterm".to_string(),
        }
    }

    #[test]
    fn test_run_args() {
        assert_eq!(
            DockerCli::run_args(&spec("demo-1")),
            vec![
                "run",
                "--detach",
                "--name",
                "demo-1",
                "--publish",
                "8101:8000",
                "--network",
                "modterm",
                "modterm-module:latest"
            ]
        );
    }

    #[test]
    fn test_run_spec_validation() {
        assert!(spec("demo-1").validate().is_ok());
        assert!(spec("demo; rm -rf /").validate().is_err());
        assert!(spec("--privileged").validate().is_err());

        let mut bad_image = spec("demo-1");
        bad_image.image = "--privileged".to_string();
        assert!(bad_image.validate().is_err());

        let mut bad_port = spec("demo-1");
        bad_port.host_port = 0;
        assert!(bad_port.validate().is_err());
    }

    #[tokio::test]
    async fn test_docker_cli_rejects_invalid_names_before_dispatch() {
        // The binary does not exist; validation must fail before anything is spawned
        let runtime = DockerCli::new("modterm-no-such-runtime", Duration::from_secs(1));
        let err = runtime.remove("bad name", true).await.unwrap_err();
        assert!(err.to_string().contains("Invalid container name"));
        let err = runtime.stop("").await.unwrap_err();
        assert!(err.to_string().contains("Invalid container name"));
    }

    #[tokio::test]
    async fn test_docker_cli_reports_exit_status() -> Result<()> {
        // `false` ignores its arguments and exits with 1
        let runtime = DockerCli::new("false", Duration::from_secs(5));
        assert!(runtime.remove("demo-1", true).await.is_err());

        let runtime = DockerCli::new("true", Duration::from_secs(5));
        runtime.remove("demo-1", true).await?;
        runtime.run(&spec("demo-1")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_if_exists_never_fails() {
        let runtime = Arc::new(FakeRuntime {
            fail_remove: true,
            ..Default::default()
        });
        let driver = ContainerDriver::new(Arc::clone(&runtime), "img", "net");
        let mut log = OperationLog::new();

        driver.remove_if_exists("demo-1", &mut log).await;

        assert_eq!(
            runtime.calls(),
            vec![RuntimeCall::Remove("demo-1".to_string(), true)]
        );
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].severity, Severity::Info);
        assert!(log.entries()[0].message.contains("No such container"));
    }

    #[tokio::test]
    async fn test_start_publishes_internal_port() -> Result<()> {
        let runtime = Arc::new(FakeRuntime::default());
        let driver = ContainerDriver::new(Arc::clone(&runtime), "img:1", "net");
        let mut log = OperationLog::new();

        driver
            .start("demo-1", 8101, &mut log)
            .await
            .map_err(|e| eyre!("{}", e))?;

        assert_eq!(
            runtime.calls(),
            vec![RuntimeCall::Run(RunSpec {
                name: "demo-1".to_string(),
                image: "img:1".to_string(),
                host_port: 8101,
                container_port: 8000,
                network: "net".to_string(),
            })]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_start_failure_is_a_runtime_error() {
        let runtime = Arc::new(FakeRuntime {
            fail_run: true,
            ..Default::default()
        });
        let driver = ContainerDriver::new(Arc::clone(&runtime), "img", "net");
        let mut log = OperationLog::new();

        let err = driver.start("demo-1", 8101, &mut log).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Runtime { ref container, .. } if container == "demo-1"));
        assert_eq!(log.entries()[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_teardown_ignores_errors() {
        let runtime = Arc::new(FakeRuntime {
            fail_stop: true,
            fail_remove: true,
            ..Default::default()
        });
        let driver = ContainerDriver::new(Arc::clone(&runtime), "img", "net");
        let mut log = OperationLog::new();

        driver.teardown("demo-1", &mut log).await;

        assert_eq!(
            runtime.calls(),
            vec![
                RuntimeCall::Stop("demo-1".to_string()),
                RuntimeCall::Remove("demo-1".to_string(), true)
            ]
        );
        assert!(log.entries().iter().all(|e| e.severity == Severity::Warn));
    }
}
