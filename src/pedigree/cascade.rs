//! Cat deletion cascade and the reconciliation sweep that repairs a cascade
//! which stopped halfway.

use std::collections::HashSet;

use serde::Serialize;

use super::ParentageEdge;
use crate::error::{CatteryError, Result};
use crate::store::PedigreeRepository;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    pub cat_id: String,
    pub edges_removed: usize,
    pub snapshot_removed: bool,
    /// Steps that failed; the sweep cleans up what they left behind
    pub failures: Vec<String>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DanglingReport {
    /// Edges whose parent or child no longer exists
    pub edges: Vec<ParentageEdge>,
    /// Snapshot roots that no longer exist
    pub snapshots: Vec<String>,
}

impl DanglingReport {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.snapshots.is_empty()
    }
}

/// Delete a cat with its edges and saved tree.
///
/// Best effort: a failed edge or snapshot step is logged and reported, and
/// the cat record is still removed.
pub fn delete_cat<S>(store: &S, cat_id: &str) -> Result<CascadeReport>
where
    S: PedigreeRepository + ?Sized,
{
    if !store.cat_exists(cat_id)? {
        return Err(CatteryError::CatNotFound(cat_id.to_string()));
    }

    let mut report = CascadeReport {
        cat_id: cat_id.to_string(),
        ..CascadeReport::default()
    };

    match store.delete_all_edges_for(cat_id) {
        Ok(removed) => report.edges_removed = removed,
        Err(e) => {
            log::error!("Cascade for cat {}: removing edges failed: {}", cat_id, e);
            report.failures.push(format!("edges: {}", e));
        }
    }

    match store.delete_snapshot(cat_id) {
        Ok(removed) => report.snapshot_removed = removed,
        Err(e) => {
            log::error!("Cascade for cat {}: removing saved tree failed: {}", cat_id, e);
            report.failures.push(format!("snapshot: {}", e));
        }
    }

    store.delete_cat(cat_id)?;

    log::info!(
        "Deleted cat {} ({} edges, snapshot removed: {})",
        cat_id,
        report.edges_removed,
        report.snapshot_removed
    );
    Ok(report)
}

/// Report references to cats that no longer exist, without changing anything.
pub fn find_dangling<S>(store: &S) -> Result<DanglingReport>
where
    S: PedigreeRepository + ?Sized,
{
    let cat_ids: HashSet<String> = store.list_cats()?.into_iter().map(|c| c.id).collect();

    let edges = store
        .list_edges()?
        .into_iter()
        .filter(|e| !cat_ids.contains(&e.parent_id) || !cat_ids.contains(&e.child_id))
        .collect();

    let snapshots = store
        .list_snapshot_roots()?
        .into_iter()
        .filter(|root| !cat_ids.contains(root))
        .collect();

    Ok(DanglingReport { edges, snapshots })
}

/// Remove everything `find_dangling` reports. Returns what was removed.
pub fn sweep<S>(store: &S) -> Result<DanglingReport>
where
    S: PedigreeRepository + ?Sized,
{
    let found = find_dangling(store)?;
    let mut removed = DanglingReport::default();

    for edge in found.edges {
        if store.delete_edge(&edge.edge_id)? {
            log::debug!("Sweep removed dangling edge {}", edge.edge_id);
            removed.edges.push(edge);
        }
    }
    for root in found.snapshots {
        if store.delete_snapshot(&root)? {
            log::debug!("Sweep removed orphaned saved tree {}", root);
            removed.snapshots.push(root);
        }
    }

    if !removed.is_empty() {
        log::warn!(
            "Sweep removed {} dangling edges and {} orphaned saved trees",
            removed.edges.len(),
            removed.snapshots.len()
        );
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Cat, Gender, NewCat};
    use crate::pedigree::{children_of, materialize, parents_of, ParentKind, SavedPedigreeTree, TreeOptions};
    use crate::store::{CatStore, MemoryStore, ParentageStore, SnapshotStore};
    use chrono::NaiveDate;

    fn add(store: &MemoryStore, name: &str, gender: Gender) -> Cat {
        let cat = Cat::from_new(NewCat::new(name, gender, NaiveDate::from_ymd_opt(2018, 8, 8).unwrap())).unwrap();
        store.insert_cat(&cat).unwrap();
        cat
    }

    #[test]
    fn test_delete_removes_every_reference() {
        let store = MemoryStore::new();
        let grandma = add(&store, "Grandma", Gender::Female);
        let bella = add(&store, "Bella", Gender::Female);
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        store.insert_edge(&grandma.id, &bella.id, ParentKind::Mother).unwrap();
        store.insert_edge(&bella.id, &luna.id, ParentKind::Mother).unwrap();
        store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();

        let tree = materialize(&store, &bella.id, &TreeOptions::default()).unwrap();
        store.save_snapshot(&SavedPedigreeTree::from_view(tree)).unwrap();

        let report = delete_cat(&store, &bella.id).unwrap();
        assert_eq!(report.edges_removed, 2);
        assert!(report.snapshot_removed);
        assert!(report.is_complete());

        assert!(parents_of(&store, &luna.id).unwrap().mother.is_none());
        assert!(children_of(&store, &grandma.id).unwrap().is_empty());
        assert!(store.list_edges().unwrap().iter().all(|e| !e.touches(&bella.id)));
        assert!(store.get_cat(&bella.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_cat() {
        let store = MemoryStore::new();
        assert!(matches!(delete_cat(&store, "gone"), Err(CatteryError::CatNotFound(_))));
    }

    #[test]
    fn test_sweep_removes_dangling_references() {
        let store = MemoryStore::new();
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        let keep = store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();

        let ghost = add(&store, "Ghost", Gender::Female);
        store.insert_edge(&ghost.id, &luna.id, ParentKind::Mother).unwrap();
        let tree = materialize(&store, &ghost.id, &TreeOptions::default()).unwrap();
        store.save_snapshot(&SavedPedigreeTree::from_view(tree)).unwrap();
        // Simulate a cascade that only got as far as the cat record
        store.delete_cat(&ghost.id).unwrap();

        let found = find_dangling(&store).unwrap();
        assert_eq!(found.edges.len(), 1);
        assert_eq!(found.snapshots, vec![ghost.id.clone()]);
        assert_eq!(store.list_edges().unwrap().len(), 2);

        let removed = sweep(&store).unwrap();
        assert_eq!(removed.edges.len(), 1);
        assert_eq!(removed.snapshots.len(), 1);
        assert_eq!(store.list_edges().unwrap(), vec![keep]);
        assert!(find_dangling(&store).unwrap().is_empty());
    }
}
