use serde::Serialize;

use super::rules::{validate_edge, RulePolicy};
use super::{ParentKind, ParentageEdge, ProposedEdge};
use crate::catalog::Cat;
use crate::error::{CatteryError, Result};
use crate::store::{CatStore, ParentageStore};

/// Resolved parents of one cat
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parents {
    pub mother: Option<Cat>,
    pub father: Option<Cat>,
}

impl Parents {
    /// Same record with internal notes stripped from both parents
    pub fn public_view(&self) -> Parents {
        Parents {
            mother: self.mother.as_ref().map(Cat::public_view),
            father: self.father.as_ref().map(Cat::public_view),
        }
    }
}

/// One offspring of a cat, tagged with the slot the cat fills
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildLink {
    pub edge_id: String,
    #[serde(rename = "type")]
    pub relation: ParentKind,
    pub cat: Cat,
}

/// Mother and father of `cat_id`. A parent edge pointing at a deleted cat
/// resolves to `None`.
pub fn parents_of<S>(store: &S, cat_id: &str) -> Result<Parents>
where
    S: CatStore + ParentageStore + ?Sized,
{
    if !store.cat_exists(cat_id)? {
        return Err(CatteryError::CatNotFound(cat_id.to_string()));
    }

    let mut parents = Parents::default();
    for edge in store.edges_by_child(cat_id)? {
        let parent = store.get_cat(&edge.parent_id)?;
        match edge.kind {
            ParentKind::Mother => parents.mother = parent,
            ParentKind::Father => parents.father = parent,
        }
    }
    Ok(parents)
}

/// Cats for which `cat_id` is recorded as a parent
pub fn children_of<S>(store: &S, cat_id: &str) -> Result<Vec<ChildLink>>
where
    S: CatStore + ParentageStore + ?Sized,
{
    if !store.cat_exists(cat_id)? {
        return Err(CatteryError::CatNotFound(cat_id.to_string()));
    }

    let mut children = Vec::new();
    for edge in store.edges_by_parent(cat_id)? {
        if let Some(cat) = store.get_cat(&edge.child_id)? {
            children.push(ChildLink {
                edge_id: edge.edge_id,
                relation: edge.kind,
                cat,
            });
        }
    }
    Ok(children)
}

/// Validate `proposed`, then store it (replacing the previous occupant of the slot).
pub fn link_parent<S>(store: &S, proposed: &ProposedEdge, policy: &RulePolicy) -> Result<ParentageEdge>
where
    S: CatStore + ParentageStore + ?Sized,
{
    validate_edge(store, proposed, policy)?.into_result()?;
    let edge = store.insert_edge(&proposed.parent_id, &proposed.child_id, proposed.kind)?;
    log::info!(
        "Recorded {} as {} of {} (edge {})",
        edge.parent_id,
        edge.kind,
        edge.child_id,
        edge.edge_id
    );
    Ok(edge)
}
