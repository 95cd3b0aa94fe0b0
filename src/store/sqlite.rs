use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{CatStore, ParentageStore, SnapshotStore};
use crate::catalog::{Cat, Category, Gender};
use crate::error::{CatteryError, Result};
use crate::pedigree::{ParentKind, ParentageEdge, PedigreeTreeView, SavedPedigreeTree};

const CAT_COLUMNS: &str = "cat_id, name, subtitle, description, age, color, status, gender, \
     birth_date, registration_number, image_url, gallery_json, is_displayed, notes, \
     category, internal_notes, created_at, updated_at";

const EDGE_COLUMNS: &str = "edge_id, parent_id, child_id, relation_type, created_at";

/// Repository over a borrowed SQLite connection (usually from `Db::with_connection`)
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

/// Raw column values; converted to domain types outside the rusqlite row closure
struct CatRow {
    id: String,
    name: String,
    subtitle: String,
    description: String,
    age: String,
    color: String,
    status: String,
    gender: String,
    birth_date: String,
    registration_number: Option<String>,
    image_url: String,
    gallery_json: String,
    is_displayed: bool,
    notes: Option<String>,
    category: Option<String>,
    internal_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CatRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            subtitle: row.get(2)?,
            description: row.get(3)?,
            age: row.get(4)?,
            color: row.get(5)?,
            status: row.get(6)?,
            gender: row.get(7)?,
            birth_date: row.get(8)?,
            registration_number: row.get(9)?,
            image_url: row.get(10)?,
            gallery_json: row.get(11)?,
            is_displayed: row.get(12)?,
            notes: row.get(13)?,
            category: row.get(14)?,
            internal_notes: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    fn into_cat(self) -> Result<Cat> {
        Ok(Cat {
            gender: self.gender.parse::<Gender>()?,
            birth_date: parse_date(&self.birth_date)?,
            gallery: serde_json::from_str(&self.gallery_json)?,
            category: self.category.as_deref().map(str::parse::<Category>).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            name: self.name,
            subtitle: self.subtitle,
            description: self.description,
            age: self.age,
            color: self.color,
            status: self.status,
            registration_number: self.registration_number,
            image_url: self.image_url,
            is_displayed: self.is_displayed,
            notes: self.notes,
            internal_notes: self.internal_notes,
        })
    }
}

struct EdgeRow {
    edge_id: String,
    parent_id: String,
    child_id: String,
    relation_type: String,
    created_at: String,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            edge_id: row.get(0)?,
            parent_id: row.get(1)?,
            child_id: row.get(2)?,
            relation_type: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_edge(self) -> Result<ParentageEdge> {
        Ok(ParentageEdge {
            kind: self.relation_type.parse::<ParentKind>()?,
            created_at: parse_timestamp(&self.created_at)?,
            edge_id: self.edge_id,
            parent_id: self.parent_id,
            child_id: self.child_id,
        })
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatteryError::InvalidInput(format!("bad stored timestamp {:?}: {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| CatteryError::InvalidInput(format!("bad stored date {:?}: {}", s, e)))
}

impl SqliteStore<'_> {
    fn query_cats(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Cat>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, CatRow::from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        rows.into_iter().map(CatRow::into_cat).collect()
    }

    fn query_edges(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<ParentageEdge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, EdgeRow::from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    fn write_cat(&self, sql: &str, cat: &Cat) -> Result<usize> {
        let gallery_json = serde_json::to_string(&cat.gallery)?;
        let changed = self.conn.execute(
            sql,
            params![
                cat.id,
                cat.name,
                cat.subtitle,
                cat.description,
                cat.age,
                cat.color,
                cat.status,
                cat.gender.as_str(),
                cat.birth_date.format("%Y-%m-%d").to_string(),
                cat.registration_number,
                cat.image_url,
                gallery_json,
                cat.is_displayed,
                cat.notes,
                cat.category.map(|c| c.as_str()),
                cat.internal_notes,
                cat.created_at.to_rfc3339(),
                cat.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed)
    }
}

impl CatStore for SqliteStore<'_> {
    fn get_cat(&self, id: &str) -> Result<Option<Cat>> {
        let sql = format!("SELECT {} FROM cats WHERE cat_id = ?1", CAT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], CatRow::from_row)
            .optional()?;
        row.map(CatRow::into_cat).transpose()
    }

    fn list_cats(&self) -> Result<Vec<Cat>> {
        let sql = format!("SELECT {} FROM cats ORDER BY name COLLATE NOCASE, cat_id", CAT_COLUMNS);
        self.query_cats(&sql, &[])
    }

    fn insert_cat(&self, cat: &Cat) -> Result<()> {
        let sql = format!(
            "INSERT INTO cats ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            CAT_COLUMNS
        );
        self.write_cat(&sql, cat)?;
        Ok(())
    }

    fn save_cat(&self, cat: &Cat) -> Result<bool> {
        let changed = self.write_cat(
            r#"
            UPDATE cats SET
                name = ?2, subtitle = ?3, description = ?4, age = ?5, color = ?6,
                status = ?7, gender = ?8, birth_date = ?9, registration_number = ?10,
                image_url = ?11, gallery_json = ?12, is_displayed = ?13, notes = ?14,
                category = ?15, internal_notes = ?16, created_at = ?17, updated_at = ?18
            WHERE cat_id = ?1
            "#,
            cat,
        )?;
        Ok(changed > 0)
    }

    fn delete_cat(&self, id: &str) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM cats WHERE cat_id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn cat_exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM cats WHERE cat_id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

impl ParentageStore for SqliteStore<'_> {
    fn edge_for(&self, child_id: &str, kind: ParentKind) -> Result<Option<ParentageEdge>> {
        let sql = format!(
            "SELECT {} FROM parentage WHERE child_id = ?1 AND relation_type = ?2",
            EDGE_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![child_id, kind.as_str()], EdgeRow::from_row)
            .optional()?;
        row.map(EdgeRow::into_edge).transpose()
    }

    fn edges_by_child(&self, child_id: &str) -> Result<Vec<ParentageEdge>> {
        let sql = format!(
            "SELECT {} FROM parentage WHERE child_id = ?1 ORDER BY relation_type",
            EDGE_COLUMNS
        );
        self.query_edges(&sql, &[&child_id])
    }

    fn edges_by_parent(&self, parent_id: &str) -> Result<Vec<ParentageEdge>> {
        let sql = format!(
            "SELECT {} FROM parentage WHERE parent_id = ?1 ORDER BY created_at, edge_id",
            EDGE_COLUMNS
        );
        self.query_edges(&sql, &[&parent_id])
    }

    fn get_edge(&self, edge_id: &str) -> Result<Option<ParentageEdge>> {
        let sql = format!("SELECT {} FROM parentage WHERE edge_id = ?1", EDGE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![edge_id], EdgeRow::from_row)
            .optional()?;
        row.map(EdgeRow::into_edge).transpose()
    }

    fn list_edges(&self) -> Result<Vec<ParentageEdge>> {
        let sql = format!("SELECT {} FROM parentage ORDER BY child_id, relation_type", EDGE_COLUMNS);
        self.query_edges(&sql, &[])
    }

    fn insert_edge(&self, parent_id: &str, child_id: &str, kind: ParentKind) -> Result<ParentageEdge> {
        let edge = ParentageEdge::new(parent_id, child_id, kind);
        // One statement: the superseded edge is replaced, new id and all
        self.conn.execute(
            r#"
            INSERT INTO parentage (edge_id, parent_id, child_id, relation_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(child_id, relation_type) DO UPDATE SET
                edge_id = excluded.edge_id,
                parent_id = excluded.parent_id,
                created_at = excluded.created_at
            "#,
            params![
                edge.edge_id,
                edge.parent_id,
                edge.child_id,
                edge.kind.as_str(),
                edge.created_at.to_rfc3339(),
            ],
        )?;
        Ok(edge)
    }

    fn delete_edge(&self, edge_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM parentage WHERE edge_id = ?1", params![edge_id])?;
        Ok(changed > 0)
    }

    fn delete_all_edges_for(&self, cat_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM parentage WHERE parent_id = ?1 OR child_id = ?1",
            params![cat_id],
        )?;
        Ok(changed)
    }
}

impl SnapshotStore for SqliteStore<'_> {
    fn load_snapshot(&self, root_cat_id: &str) -> Result<Option<SavedPedigreeTree>> {
        let row = self
            .conn
            .query_row(
                "SELECT root_cat_id, name, description, generations, tree_json, saved_at \
                 FROM pedigree_trees WHERE root_cat_id = ?1",
                params![root_cat_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((root_cat_id, name, description, generations, tree_json, saved_at)) = row else {
            return Ok(None);
        };
        let tree: PedigreeTreeView = serde_json::from_str(&tree_json)?;
        Ok(Some(SavedPedigreeTree {
            root_cat_id,
            name,
            description,
            generations: generations.max(0) as usize,
            tree,
            saved_at: parse_timestamp(&saved_at)?,
        }))
    }

    fn save_snapshot(&self, snapshot: &SavedPedigreeTree) -> Result<()> {
        let tree_json = serde_json::to_string(&snapshot.tree)?;
        self.conn.execute(
            r#"
            INSERT INTO pedigree_trees (root_cat_id, name, description, generations, tree_json, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(root_cat_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                generations = excluded.generations,
                tree_json = excluded.tree_json,
                saved_at = excluded.saved_at
            "#,
            params![
                snapshot.root_cat_id,
                snapshot.name,
                snapshot.description,
                snapshot.generations as i64,
                tree_json,
                snapshot.saved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete_snapshot(&self, root_cat_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM pedigree_trees WHERE root_cat_id = ?1",
            params![root_cat_id],
        )?;
        Ok(changed > 0)
    }

    fn list_snapshot_roots(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT root_cat_id FROM pedigree_trees ORDER BY saved_at DESC")?;
        let roots = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewCat;
    use crate::db::migrate;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (Connection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        migrate::run_migrations(&mut conn, &migrations_dir).unwrap();
        (conn, temp_dir)
    }

    fn cat(store: &SqliteStore<'_>, name: &str, gender: Gender) -> Cat {
        let mut input = NewCat::new(name, gender, NaiveDate::from_ymd_opt(2022, 5, 17).unwrap());
        input.gallery = vec!["a.jpg".into(), "b.jpg".into()];
        let cat = Cat::from_new(input).unwrap();
        store.insert_cat(&cat).unwrap();
        cat
    }

    #[test]
    fn test_cat_roundtrip_preserves_fields() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let luna = cat(&store, "Luna", Gender::Female);

        let loaded = store.get_cat(&luna.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Luna");
        assert_eq!(loaded.gallery, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
        assert_eq!(loaded.birth_date, luna.birth_date);
        assert!(store.cat_exists(&luna.id).unwrap());
        assert!(store.get_cat("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_and_delete_cat() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let mut luna = cat(&store, "Luna", Gender::Female);

        luna.status = "reserved".into();
        assert!(store.save_cat(&luna).unwrap());
        assert_eq!(store.get_cat(&luna.id).unwrap().unwrap().status, "reserved");

        assert!(store.delete_cat(&luna.id).unwrap());
        assert!(!store.delete_cat(&luna.id).unwrap());
        assert!(!store.save_cat(&luna).unwrap());
    }

    #[test]
    fn test_insert_edge_replaces_same_slot() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let first = cat(&store, "Bella", Gender::Female);
        let second = cat(&store, "Cleo", Gender::Female);
        let kitten = cat(&store, "Luna", Gender::Female);

        store.insert_edge(&first.id, &kitten.id, ParentKind::Mother).unwrap();
        let replacement = store.insert_edge(&second.id, &kitten.id, ParentKind::Mother).unwrap();

        let edges = store.edges_by_child(&kitten.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent_id, second.id);
        assert_eq!(edges[0].edge_id, replacement.edge_id);
        assert!(store.edges_by_parent(&first.id).unwrap().is_empty());
    }

    #[test]
    fn test_self_edge_blocked_by_schema() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let luna = cat(&store, "Luna", Gender::Female);
        assert!(store.insert_edge(&luna.id, &luna.id, ParentKind::Mother).is_err());
    }

    #[test]
    fn test_delete_all_edges_for() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let dam = cat(&store, "Bella", Gender::Female);
        let sire = cat(&store, "Oliver", Gender::Male);
        let kitten = cat(&store, "Luna", Gender::Female);
        let grandkitten = cat(&store, "Nova", Gender::Female);

        store.insert_edge(&dam.id, &kitten.id, ParentKind::Mother).unwrap();
        store.insert_edge(&sire.id, &kitten.id, ParentKind::Father).unwrap();
        store.insert_edge(&kitten.id, &grandkitten.id, ParentKind::Mother).unwrap();

        assert_eq!(store.delete_all_edges_for(&kitten.id).unwrap(), 3);
        assert!(store.list_edges().unwrap().is_empty());
    }

    #[test]
    fn test_edge_lookup_by_slot() {
        let (conn, _temp) = setup();
        let store = SqliteStore::new(&conn);
        let sire = cat(&store, "Oliver", Gender::Male);
        let kitten = cat(&store, "Luna", Gender::Female);

        let edge = store.insert_edge(&sire.id, &kitten.id, ParentKind::Father).unwrap();
        assert_eq!(store.edge_for(&kitten.id, ParentKind::Father).unwrap(), Some(edge.clone()));
        assert!(store.edge_for(&kitten.id, ParentKind::Mother).unwrap().is_none());
        assert_eq!(store.get_edge(&edge.edge_id).unwrap(), Some(edge.clone()));
        assert!(store.delete_edge(&edge.edge_id).unwrap());
        assert!(store.get_edge(&edge.edge_id).unwrap().is_none());
    }
}
