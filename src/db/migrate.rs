//! Numbered SQL migrations.
//!
//! Files in the migrations directory are named `NNN_description.sql` and
//! applied in version order, each in its own transaction together with its
//! `schema_migrations` row.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::error::{CatteryError, Result};

/// Tables every migrated database must contain
pub const EXPECTED_TABLES: &[&str] = &[
    "cats",
    "parentage",
    "pedigree_trees",
    "reservations",
    "schema_migrations",
    "site_settings",
    "tiktok_videos",
];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// A row of `schema_migrations`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
}

#[derive(Debug)]
struct MigrationFile {
    version: u32,
    name: String,
    path: PathBuf,
}

impl MigrationFile {
    /// `None` for files that are not `.sql`; an error for `.sql` files without a numeric prefix
    fn from_path(path: PathBuf) -> Result<Option<Self>> {
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            return Ok(None);
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CatteryError::Config(format!("Unreadable migration name: {}", path.display())))?
            .to_string();

        let version = name
            .split_once('_')
            .and_then(|(prefix, _)| prefix.parse::<u32>().ok())
            .ok_or_else(|| {
                CatteryError::Config(format!("Migration {} must be named NNN_description.sql", name))
            })?;

        Ok(Some(Self { version, name, path }))
    }
}

/// Migration files in `dir`, lowest version first. Duplicate versions are an error.
fn scan(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        if let Some(file) = MigrationFile::from_path(entry?.path())? {
            files.push(file);
        }
    }
    files.sort_by_key(|f| f.version);

    if let Some(pair) = files.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(CatteryError::Config(format!(
            "Migrations {} and {} share version {}",
            pair[0].name, pair[1].name, pair[0].version
        )));
    }
    Ok(files)
}

/// Migrations recorded in `schema_migrations`, by version.
/// An unmigrated database has none.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    conn.execute(TRACKING_TABLE, [])?;
    let mut stmt = conn.prepare("SELECT version, name FROM schema_migrations ORDER BY version")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// User tables present in the database
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Names from `EXPECTED_TABLES` that are missing
pub fn missing_tables(conn: &Connection) -> Result<Vec<String>> {
    let present: HashSet<String> = list_tables(conn)?.into_iter().collect();
    Ok(EXPECTED_TABLES
        .iter()
        .filter(|t| !present.contains(**t))
        .map(|t| t.to_string())
        .collect())
}

/// Apply every migration in `dir` whose version is not yet recorded.
/// Returns how many were applied.
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<usize> {
    let done: HashSet<u32> = applied_migrations(conn)?.into_iter().map(|m| m.version).collect();
    let pending: Vec<MigrationFile> = scan(dir)?
        .into_iter()
        .filter(|f| !done.contains(&f.version))
        .collect();
    log::debug!("{} migrations applied, {} pending", done.len(), pending.len());

    for file in &pending {
        let sql = fs::read_to_string(&file.path)?;
        log::info!("Applying migration {}", file.name);

        let tx = conn.transaction()?;
        tx.execute_batch(&sql).map_err(|source| CatteryError::Migration {
            name: file.name.clone(),
            source,
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![file.version, file.name],
        )?;
        tx.commit()?;
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project_migrations() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }

    #[test]
    fn test_scan_orders_by_version_and_skips_other_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("010_later.sql"), "CREATE TABLE later (id INTEGER);").unwrap();
        fs::write(temp_dir.path().join("002_earlier.sql"), "CREATE TABLE earlier (id INTEGER);").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "not sql").unwrap();

        let files = scan(temp_dir.path()).unwrap();
        let versions: Vec<u32> = files.iter().map(|f| f.version).collect();
        assert_eq!(versions, vec![2, 10]);
        assert_eq!(files[0].name, "002_earlier");
    }

    #[test]
    fn test_scan_rejects_bad_names_and_duplicate_versions() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("first_cats.sql"), "SELECT 1;").unwrap();
        assert!(matches!(scan(temp_dir.path()), Err(CatteryError::Config(_))));

        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        fs::write(temp_dir.path().join("001_b.sql"), "SELECT 1;").unwrap();
        assert!(matches!(scan(temp_dir.path()), Err(CatteryError::Config(_))));
    }

    #[test]
    fn test_failed_migration_leaves_no_trace() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("001_ok.sql"), "CREATE TABLE ok (id INTEGER);").unwrap();
        fs::write(dir.join("002_broken.sql"), "CREATE TABLE half (id INTEGER); NOT SQL;").unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        let err = run_migrations(&mut conn, &dir).unwrap_err();
        assert!(matches!(err, CatteryError::Migration { ref name, .. } if name == "002_broken"));

        let applied = applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec![AppliedMigration { version: 1, name: "001_ok".to_string() }]);
        let tables = list_tables(&conn).unwrap();
        assert!(tables.contains(&"ok".to_string()));
        assert!(!tables.contains(&"half".to_string()));
    }

    #[test]
    fn test_project_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        assert_eq!(run_migrations(&mut conn, &project_migrations()).unwrap(), 4);
        assert!(missing_tables(&conn).unwrap().is_empty());

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_parentage_%'")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert!(indexes.contains(&"idx_parentage_parent".to_string()));
        assert!(indexes.contains(&"idx_parentage_child".to_string()));

        assert_eq!(run_migrations(&mut conn, &project_migrations()).unwrap(), 0);
        assert_eq!(applied_migrations(&conn).unwrap().len(), 4);
    }
}
