use crate::config::ModtermConfig;
use crate::store::sqlite_modules::{ModuleRecord, ModuleRow};
use crate::store::{Store, create_store_dir};
use color_eyre::eyre::{WrapErr, eyre};
use color_eyre::{Result, Section};
use sqlx::sqlite;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Columns selected for every module query, in [`ModuleRow`] order.
const MODULE_COLUMNS: &str = "id, name, description, github_url, module_type, service_url, \
                              container_name, port, enabled, created_at, updated_at";

/// Representation of the store database
#[derive(Clone, Debug)]
pub(crate) struct SQLiteStore {
    /// SQLite connection pool
    pub(crate) pool: sqlite::SqlitePool,
    /// Store location
    pub(crate) path: PathBuf,
}

impl SQLiteStore {
    /// Creates a new [`SQLiteStore`] instance.
    ///
    /// # Arguments
    /// * `pool` - A [`sqlite::SqlitePool`].
    /// * `path` - The path of the store database file.
    pub(crate) fn new(pool: sqlite::SqlitePool, path: PathBuf) -> Self {
        SQLiteStore { pool, path }
    }

    /// Compacts the database and closes the pool.
    pub(crate) async fn close(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .wrap_err("Failed to vacuum store database")?;
        self.pool.close().await;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
// Helper functions for SQLiteStore
// -------------------------------------------------------------------------------------------------

/// Initialize a [`SQLiteStore`].
///
/// This function creates and initializes the SQLite database holding the module records in the
/// directory specified in [`field@ModtermConfig::store_path`].
///
/// # Arguments
/// * `config` - The ModtermConfig containing configuration settings including the store path
///
/// # Returns
/// Returns `Ok(SQLiteStore)` if the store is successfully initialized, or an error if:
/// - Directory creation fails
/// - Database initialization fails
/// - Connection pool setup fails
pub(crate) async fn init_sqlite_store(config: &ModtermConfig) -> Result<SQLiteStore> {
    // Create the directory if it doesn't exist
    create_store_dir(&config.store_path).await?;

    // Create the connection pool
    let (pool, path) = init_pool(&config.store_path)
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to initialize store in {}",
                &config.store_path.display()
            )
        })
        .suggestion(format!(
            "Ensure that {} exists and you have read and write permissions to it",
            &config.store_path.display()
        ))?;

    Ok(SQLiteStore::new(pool, path))
}

/// Initializes and configures a SQLite connection pool for the store database.
///
/// This function:
/// - Creates a SQLite database file if it doesn't exist
/// - Configures connection options including WAL journal mode and synchronous settings
/// - Sets up a connection pool sized based on CPU cores
/// - Runs any pending database migrations
///
/// # Arguments
/// * `path` - Base directory path where the SQLite database file will be created
async fn init_pool(path: &Path) -> Result<(sqlite::SqlitePool, PathBuf)> {
    // Set the full path for the SQLite database file
    let path = path.join("store.sqlite");

    let database_url = format!(
        "sqlite://{}",
        path.to_str()
            .ok_or_else(|| eyre!("{:?} is not valid UTF-8", path))?
    );
    let pool_timeout = std::time::Duration::from_secs(30);
    // We set the number of connections to 4 times the number of physical CPUs
    let max_connections =
        u32::try_from(num_cpus::get_physical() * 4).wrap_err("Failed to convert usize to u32")?;

    let connection_options = sqlite::SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(pool_timeout);

    let pool = sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connection_options)
        .await?;

    // Create the necessary tables, if they do not exist already
    sqlx::migrate!("./db")
        .run(&pool)
        .await
        .wrap_err("Failed to initialize store database")?;

    Ok((pool, path))
}

// -------------------------------------------------------------------------------------------------
// Store impl for SQLiteStore
// -------------------------------------------------------------------------------------------------

impl Store for SQLiteStore {
    #[instrument(skip(self, id), fields(id = id.as_ref()))]
    async fn get_module<S: AsRef<str>>(&self, id: S) -> Result<Option<ModuleRecord>> {
        let row = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {} FROM modules WHERE id = ?1",
            MODULE_COLUMNS
        ))
        .bind(id.as_ref())
        .fetch_optional(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to fetch module {}", id.as_ref()))?;

        match row {
            Some(row) => Ok(Some(ModuleRecord::try_from(row)?)),
            None => {
                debug!("Module {} not found in {}", id.as_ref(), self.path.display());
                Ok(None)
            }
        }
    }

    async fn upsert_module(&self, module: &ModuleRecord) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO modules (id, name, description, github_url, module_type, service_url,
                     container_name, port, enabled, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(id)
DO UPDATE SET
  name = excluded.name,
  description = excluded.description,
  github_url = excluded.github_url,
  module_type = excluded.module_type,
  service_url = excluded.service_url,
  container_name = excluded.container_name,
  port = excluded.port,
  enabled = excluded.enabled,
  updated_at = excluded.updated_at
            "#,
        )
        .bind(&module.id)
        .bind(&module.name)
        .bind(&module.description)
        .bind(&module.github_url)
        .bind(&module.module_type)
        .bind(&module.service_url)
        .bind(&module.container_name)
        .bind(module.port.map(i64::from))
        .bind(module.enabled)
        .bind(module.created_at)
        .bind(module.updated_at)
        .execute(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to upsert module {}", module.id))?;

        Ok(())
    }

    async fn remove_module<S: AsRef<str>>(&self, id: S) -> Result<()> {
        sqlx::query("DELETE FROM modules WHERE id = ?1")
            .bind(id.as_ref())
            .execute(&self.pool)
            .await
            .wrap_err_with(|| format!("Failed to remove module {}", id.as_ref()))?;

        Ok(())
    }

    async fn get_all_modules(&self) -> Result<Vec<ModuleRecord>> {
        let rows = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {} FROM modules ORDER BY created_at, id",
            MODULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .wrap_err("Failed to fetch modules")?;

        rows.into_iter().map(ModuleRecord::try_from).collect()
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
