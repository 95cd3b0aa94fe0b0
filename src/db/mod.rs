use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;
use crate::error::{Result, CatteryError};

/// SQLite pragmas applied to every connection.
/// WAL for concurrent readers during a write, NORMAL sync, in-memory temp store.
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA busy_timeout = 5000;";

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new synchronous connection (CLIs, canvas sessions)
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(CatteryError::Database)?;
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task.
    ///
    /// Every service operation is one call: validation and mutation share the
    /// connection, so a rule check and the write it guards see the same state.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path).map_err(CatteryError::Database)?;
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            CatteryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("database task failed: {}", e),
            ))
        })?
    }

    /// Apply pending migrations from `migrations_dir`
    pub async fn migrate(&self, migrations_dir: &Path) -> Result<()> {
        let dir = migrations_dir.to_path_buf();
        let applied = self
            .with_connection(move |conn| migrate::run_migrations(conn, &dir))
            .await?;
        if applied > 0 {
            log::info!("Applied {} migrations to {}", applied, self.path.display());
        }
        Ok(())
    }
}

pub mod migrate;
