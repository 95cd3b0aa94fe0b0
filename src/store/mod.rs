//! Repository interfaces for cats, parentage edges and saved trees.
//!
//! The rules engine, materializer, cascade and canvas only see these traits.
//! `SqliteStore` backs the service; `MemoryStore` backs tests and embedders
//! that don't want a database file.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub(crate) use sqlite::parse_timestamp;

use crate::catalog::Cat;
use crate::error::Result;
use crate::pedigree::{ParentKind, ParentageEdge, SavedPedigreeTree};

/// Cat Entity Store
pub trait CatStore {
    /// Get a cat by id. Returns None if not found.
    fn get_cat(&self, id: &str) -> Result<Option<Cat>>;

    /// All cats, ordered by name.
    fn list_cats(&self) -> Result<Vec<Cat>>;

    /// Insert a new cat record.
    fn insert_cat(&self, cat: &Cat) -> Result<()>;

    /// Overwrite an existing record. Returns false if the id is unknown.
    fn save_cat(&self, cat: &Cat) -> Result<bool>;

    /// Delete a cat record only (no cascade). Returns true if it existed.
    fn delete_cat(&self, id: &str) -> Result<bool>;

    fn cat_exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_cat(id)?.is_some())
    }
}

/// Parentage Relation Store
pub trait ParentageStore {
    /// The edge filling `(child_id, kind)`, if any.
    fn edge_for(&self, child_id: &str, kind: ParentKind) -> Result<Option<ParentageEdge>>;

    /// Edges where `child_id` is the child (at most two).
    fn edges_by_child(&self, child_id: &str) -> Result<Vec<ParentageEdge>>;

    /// Edges where `parent_id` is the parent.
    fn edges_by_parent(&self, parent_id: &str) -> Result<Vec<ParentageEdge>>;

    fn get_edge(&self, edge_id: &str) -> Result<Option<ParentageEdge>>;

    fn list_edges(&self) -> Result<Vec<ParentageEdge>>;

    /// Replace whatever fills `(child_id, kind)` with a new edge.
    /// Callers validate first; this does not.
    fn insert_edge(&self, parent_id: &str, child_id: &str, kind: ParentKind) -> Result<ParentageEdge>;

    /// Returns true if the edge existed.
    fn delete_edge(&self, edge_id: &str) -> Result<bool>;

    /// Remove every edge touching `cat_id`. Returns the number removed.
    fn delete_all_edges_for(&self, cat_id: &str) -> Result<usize>;
}

/// Saved pedigree trees, keyed by root cat id
pub trait SnapshotStore {
    fn load_snapshot(&self, root_cat_id: &str) -> Result<Option<SavedPedigreeTree>>;

    /// Insert or overwrite the snapshot for `snapshot.root_cat_id`.
    fn save_snapshot(&self, snapshot: &SavedPedigreeTree) -> Result<()>;

    fn delete_snapshot(&self, root_cat_id: &str) -> Result<bool>;

    fn list_snapshot_roots(&self) -> Result<Vec<String>>;
}

/// Everything the pedigree core needs from persistence
pub trait PedigreeRepository: CatStore + ParentageStore + SnapshotStore {}

impl<T: CatStore + ParentageStore + SnapshotStore + ?Sized> PedigreeRepository for T {}
