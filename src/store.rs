//! This module manages the persisted module records.
//!
//! The store is the single source of truth for what modterm knows about a module: its identity,
//! where its endpoint lives and whether its last lifecycle cycle succeeded.

use crate::store::sqlite_modules::ModuleRecord;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::path::Path;
use tracing::{debug, instrument};

pub(crate) mod sqlite;
pub(crate) mod sqlite_modules;

// -------------------------------------------------------------------------------------------------
// Store trait
// -------------------------------------------------------------------------------------------------

pub(crate) trait Store {
    /// Retrieves a single module by its id.
    ///
    /// # Arguments
    /// * `id` - The id of the module to retrieve.
    ///
    /// # Errors
    /// Returns an error if there's an error during the database operation. An unknown id is not
    /// an error and yields `None`.
    async fn get_module<S: AsRef<str>>(&self, id: S) -> Result<Option<ModuleRecord>>;

    /// Adds or updates a module in the database.
    ///
    /// Records are merged on `id`. An existing record keeps its `created_at`, every other column
    /// is replaced.
    ///
    /// # Arguments
    /// * `module` - The `ModuleRecord` to be added or updated.
    ///
    /// # Errors
    /// Returns an error if there's an error during the database operation.
    async fn upsert_module(&self, module: &ModuleRecord) -> Result<()>;

    /// Removes a module from the database.
    ///
    /// Removing an unknown id succeeds.
    ///
    /// # Errors
    /// Returns an error if there's an error during the database operation.
    async fn remove_module<S: AsRef<str>>(&self, id: S) -> Result<()>;

    /// Retrieves all modules from the store, ordered by creation time.
    async fn get_all_modules(&self) -> Result<Vec<ModuleRecord>>;
}

// -------------------------------------------------------------------------------------------------
// Store directory creation
// -------------------------------------------------------------------------------------------------

/// Creates the directory holding the store database.
///
/// # Arguments
/// * `path` - Path where the store directory should be created
///
/// # Returns
/// * `Ok(())` - Directory created successfully or already exists
/// * `Err` - If directory creation fails
#[instrument(skip(path))]
async fn create_store_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    match path.as_ref().try_exists() {
        Ok(false) => {
            debug!(
                "Store directory '{}' does not exist, creating.",
                path.as_ref().display()
            );
            tokio::fs::create_dir_all(path.as_ref())
                .await
                .wrap_err_with(|| format!("Failed to create directory {:?}", path.as_ref()))?;
            Ok(())
        }
        Ok(true) => {
            debug!(
                "Store directory '{}' exists already, continuing.",
                path.as_ref().display()
            );
            Ok(())
        }
        Err(e) => Err(eyre!("{}", e)),
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
