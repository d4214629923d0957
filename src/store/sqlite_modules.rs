//! This module provides the representation of module records in the modterm store database.
//!
//! A module record describes a registered module and the last known state of the container
//! backing it.

use chrono::{DateTime, Utc};
use color_eyre::Report;
use color_eyre::eyre::WrapErr;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Port every module image serves its HTTP endpoint on inside its container.
pub(crate) const MODULE_INTERNAL_PORT: u16 = 8000;

/// Representation of a module record (row) in the database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(setter(prefix = "with"))]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModuleRecord {
    /// Stable identifier and primary key
    #[builder(setter(into))]
    pub(crate) id: String,
    /// Human readable label
    #[builder(setter(into))]
    pub(crate) name: String,
    /// Free text description (optional)
    #[builder(default)]
    pub(crate) description: Option<String>,
    /// Repository the module is built from (optional)
    #[builder(default)]
    pub(crate) github_url: Option<String>,
    /// Classification tag (optional)
    #[builder(default)]
    pub(crate) module_type: Option<String>,
    /// Address of the module's HTTP endpoint
    #[builder(setter(into))]
    pub(crate) service_url: String,
    /// Runtime name of the backing container. Falls back to `id` when unset.
    #[builder(default)]
    pub(crate) container_name: Option<String>,
    /// Host-published port, absent until the first provisioning
    #[builder(default)]
    pub(crate) port: Option<u16>,
    /// Whether the last provisioning/configuration cycle fully succeeded
    #[builder(default)]
    pub(crate) enabled: bool,
    #[builder(default = "chrono::Utc::now()")]
    pub(crate) created_at: DateTime<Utc>,
    #[builder(default = "chrono::Utc::now()")]
    pub(crate) updated_at: DateTime<Utc>,
}

impl ModuleRecord {
    /// Returns the runtime name of the backing container.
    pub(crate) fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or(&self.id)
    }

    /// Returns `true` while the module has never been provisioned with a port.
    pub(crate) fn is_pending(&self) -> bool {
        self.port.is_none()
    }

    /// Returns the record the way it is shown to readers.
    ///
    /// Pending modules are always reported as disabled, whatever the stored flag says.
    pub(crate) fn presented(mut self) -> Self {
        if self.is_pending() {
            self.enabled = false;
        }
        self
    }

    /// Refreshes `updated_at`.
    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builds the address of a module's HTTP endpoint from its container name.
pub(crate) fn service_url_for(container_name: &str) -> String {
    format!("http://{}:{}", container_name, MODULE_INTERNAL_PORT)
}

/// Raw database row, converted into a [`ModuleRecord`] after fetching.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ModuleRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) github_url: Option<String>,
    pub(crate) module_type: Option<String>,
    pub(crate) service_url: String,
    pub(crate) container_name: Option<String>,
    pub(crate) port: Option<i64>,
    pub(crate) enabled: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFrom<ModuleRow> for ModuleRecord {
    type Error = Report;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        let port = row
            .port
            .map(u16::try_from)
            .transpose()
            .wrap_err_with(|| format!("Stored port of module {} is out of range", row.id))?;

        Ok(ModuleRecord {
            id: row.id,
            name: row.name,
            description: row.description,
            github_url: row.github_url,
            module_type: row.module_type,
            service_url: row.service_url,
            container_name: row.container_name,
            port,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::Result;

    #[test]
    fn test_pending_module_is_presented_disabled() -> Result<()> {
        let module = ModuleRecordBuilder::default()
            .with_id("demo")
            .with_name("Demo")
            .with_service_url(service_url_for("demo"))
            .with_enabled(true)
            .build()?;

        assert!(module.is_pending());
        assert!(module.enabled, "stored flag is kept on the record itself");
        assert!(!module.presented().enabled, "pending module must be shown disabled");
        Ok(())
    }

    #[test]
    fn test_provisioned_module_keeps_enabled_flag() -> Result<()> {
        let module = ModuleRecordBuilder::default()
            .with_id("demo")
            .with_name("Demo")
            .with_service_url(service_url_for("demo"))
            .with_port(Some(8101))
            .with_enabled(true)
            .build()?;

        assert!(module.presented().enabled);
        Ok(())
    }

    #[test]
    fn test_container_name_falls_back_to_id() -> Result<()> {
        let mut module = ModuleRecordBuilder::default()
            .with_id("demo-1")
            .with_name("Demo")
            .with_service_url("http://elsewhere:9000")
            .build()?;
        assert_eq!(module.container_name(), "demo-1");

        module.container_name = Some("demo-container".to_string());
        assert_eq!(module.container_name(), "demo-container");
        assert_eq!(service_url_for("demo-container"), "http://demo-container:8000");
        Ok(())
    }

    #[test]
    fn test_serializes_camel_case() -> Result<()> {
        let module = ModuleRecordBuilder::default()
            .with_id("demo")
            .with_name("Demo")
            .with_github_url(Some("https://x/y".to_string()))
            .with_service_url(service_url_for("demo"))
            .build()?;

        let json = serde_json::to_value(&module)?;
        assert_eq!(json["githubUrl"], "https://x/y");
        assert_eq!(json["serviceUrl"], "http://demo:8000");
        assert!(json.get("containerName").is_some());
        Ok(())
    }

    #[test]
    fn test_row_with_invalid_port_is_rejected() {
        let now = Utc::now();
        let row = ModuleRow {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            description: None,
            github_url: None,
            module_type: None,
            service_url: service_url_for("demo"),
            container_name: None,
            port: Some(70000),
            enabled: true,
            created_at: now,
            updated_at: now,
        };

        assert!(ModuleRecord::try_from(row).is_err());
    }
}
