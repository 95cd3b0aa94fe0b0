use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{CatStore, ParentageStore, SnapshotStore};
use crate::catalog::Cat;
use crate::error::{CatteryError, Result};
use crate::pedigree::{ParentKind, ParentageEdge, SavedPedigreeTree};

#[derive(Default)]
struct State {
    cats: BTreeMap<String, Cat>,
    edges: Vec<ParentageEdge>,
    snapshots: BTreeMap<String, SavedPedigreeTree>,
}

/// In-process repository with the same semantics as `SqliteStore`
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CatteryError::Config("memory store lock poisoned".to_string()))
    }

    /// Push an edge without any checks, replace semantics included.
    /// Lets tests build states the rules engine would refuse.
    pub fn insert_edge_unchecked(&self, edge: ParentageEdge) -> Result<()> {
        let mut state = self.lock()?;
        state
            .edges
            .retain(|e| !(e.child_id == edge.child_id && e.kind == edge.kind));
        state.edges.push(edge);
        Ok(())
    }
}

impl CatStore for MemoryStore {
    fn get_cat(&self, id: &str) -> Result<Option<Cat>> {
        Ok(self.lock()?.cats.get(id).cloned())
    }

    fn list_cats(&self) -> Result<Vec<Cat>> {
        let mut cats: Vec<Cat> = self.lock()?.cats.values().cloned().collect();
        cats.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(cats)
    }

    fn insert_cat(&self, cat: &Cat) -> Result<()> {
        let mut state = self.lock()?;
        if state.cats.contains_key(&cat.id) {
            return Err(CatteryError::InvalidInput(format!("cat {} already exists", cat.id)));
        }
        state.cats.insert(cat.id.clone(), cat.clone());
        Ok(())
    }

    fn save_cat(&self, cat: &Cat) -> Result<bool> {
        let mut state = self.lock()?;
        match state.cats.get_mut(&cat.id) {
            Some(existing) => {
                *existing = cat.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_cat(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.cats.remove(id).is_some())
    }
}

impl ParentageStore for MemoryStore {
    fn edge_for(&self, child_id: &str, kind: ParentKind) -> Result<Option<ParentageEdge>> {
        Ok(self
            .lock()?
            .edges
            .iter()
            .find(|e| e.child_id == child_id && e.kind == kind)
            .cloned())
    }

    fn edges_by_child(&self, child_id: &str) -> Result<Vec<ParentageEdge>> {
        let mut edges: Vec<ParentageEdge> = self
            .lock()?
            .edges
            .iter()
            .filter(|e| e.child_id == child_id)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.kind.as_str());
        Ok(edges)
    }

    fn edges_by_parent(&self, parent_id: &str) -> Result<Vec<ParentageEdge>> {
        Ok(self
            .lock()?
            .edges
            .iter()
            .filter(|e| e.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn get_edge(&self, edge_id: &str) -> Result<Option<ParentageEdge>> {
        Ok(self.lock()?.edges.iter().find(|e| e.edge_id == edge_id).cloned())
    }

    fn list_edges(&self) -> Result<Vec<ParentageEdge>> {
        Ok(self.lock()?.edges.clone())
    }

    fn insert_edge(&self, parent_id: &str, child_id: &str, kind: ParentKind) -> Result<ParentageEdge> {
        if parent_id == child_id {
            // Mirrors the CHECK constraint on the parentage table
            return Err(CatteryError::InvalidInput(format!(
                "cat {} cannot be stored as its own parent",
                parent_id
            )));
        }
        let edge = ParentageEdge::new(parent_id, child_id, kind);
        self.insert_edge_unchecked(edge.clone())?;
        Ok(edge)
    }

    fn delete_edge(&self, edge_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let before = state.edges.len();
        state.edges.retain(|e| e.edge_id != edge_id);
        Ok(state.edges.len() != before)
    }

    fn delete_all_edges_for(&self, cat_id: &str) -> Result<usize> {
        let mut state = self.lock()?;
        let before = state.edges.len();
        state.edges.retain(|e| !e.touches(cat_id));
        Ok(before - state.edges.len())
    }
}

impl SnapshotStore for MemoryStore {
    fn load_snapshot(&self, root_cat_id: &str) -> Result<Option<SavedPedigreeTree>> {
        Ok(self.lock()?.snapshots.get(root_cat_id).cloned())
    }

    fn save_snapshot(&self, snapshot: &SavedPedigreeTree) -> Result<()> {
        self.lock()?
            .snapshots
            .insert(snapshot.root_cat_id.clone(), snapshot.clone());
        Ok(())
    }

    fn delete_snapshot(&self, root_cat_id: &str) -> Result<bool> {
        Ok(self.lock()?.snapshots.remove(root_cat_id).is_some())
    }

    fn list_snapshot_roots(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.snapshots.keys().cloned().collect())
    }
}
