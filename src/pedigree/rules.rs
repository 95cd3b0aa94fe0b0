//! Consistency rules for proposed parent edges.
//!
//! Checks only read the store. A rejection carries the reason shown to the
//! admin; store failures come back as errors instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ParentKind, ProposedEdge};
use crate::catalog::{Cat, Gender};
use crate::error::Result;
use crate::store::{CatStore, ParentageStore};

/// Why an edge (or an edit that would break an edge) was refused
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rejection {
    #[error("a cat cannot be its own parent")]
    SelfParent,

    #[error("cat {cat_id} does not exist")]
    UnknownCat { cat_id: String },

    #[error("{parent_name} cannot be a {kind}: a {kind} must be {required}, but {parent_name} is {actual}")]
    GenderMismatch {
        parent_name: String,
        kind: ParentKind,
        required: Gender,
        actual: Gender,
    },

    #[error("{parent_name} is already recorded as the {existing} of {child_name}")]
    AlreadyOtherParent {
        parent_name: String,
        child_name: String,
        existing: ParentKind,
    },

    #[error("circular relationship: {child_name} is already an ancestor of {parent_name}")]
    Circular {
        parent_name: String,
        child_name: String,
    },

    #[error("{name} is recorded as the {kind} of {count} cat(s); remove those links before changing gender")]
    GenderLocked {
        name: String,
        kind: ParentKind,
        count: usize,
    },
}

impl Rejection {
    /// User-facing reason text
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Outcome of a rule check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved)
    }

    /// Turn a rejection into `CatteryError::Rejected`
    pub fn into_result(self) -> Result<()> {
        match self {
            Verdict::Approved => Ok(()),
            Verdict::Rejected(rejection) => Err(rejection.into()),
        }
    }
}

/// Tunable parts of the rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulePolicy {
    /// Fathers must be male, mothers female
    pub enforce_gender: bool,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self { enforce_gender: true }
    }
}

/// Decide whether `proposed` may be inserted.
pub fn validate_edge<S>(store: &S, proposed: &ProposedEdge, policy: &RulePolicy) -> Result<Verdict>
where
    S: CatStore + ParentageStore + ?Sized,
{
    if proposed.parent_id == proposed.child_id {
        return Ok(Verdict::Rejected(Rejection::SelfParent));
    }

    let Some(parent) = store.get_cat(&proposed.parent_id)? else {
        return Ok(Verdict::Rejected(Rejection::UnknownCat {
            cat_id: proposed.parent_id.clone(),
        }));
    };
    let Some(child) = store.get_cat(&proposed.child_id)? else {
        return Ok(Verdict::Rejected(Rejection::UnknownCat {
            cat_id: proposed.child_id.clone(),
        }));
    };

    let required = proposed.kind.required_gender();
    if policy.enforce_gender && parent.gender != required {
        return Ok(Verdict::Rejected(Rejection::GenderMismatch {
            parent_name: parent.name,
            kind: proposed.kind,
            required,
            actual: parent.gender,
        }));
    }

    let other = proposed.kind.other();
    if let Some(existing) = store.edge_for(&child.id, other)? {
        if existing.parent_id == parent.id {
            return Ok(Verdict::Rejected(Rejection::AlreadyOtherParent {
                parent_name: parent.name,
                child_name: child.name,
                existing: other,
            }));
        }
    }

    if is_ancestor(store, &child.id, &parent.id)? {
        return Ok(Verdict::Rejected(Rejection::Circular {
            parent_name: parent.name,
            child_name: child.name,
        }));
    }

    Ok(Verdict::Approved)
}

/// Refuse a gender edit that would leave the cat in a parent slot of the wrong gender.
pub fn check_gender_change<S>(
    store: &S,
    cat: &Cat,
    new_gender: Gender,
    policy: &RulePolicy,
) -> Result<Verdict>
where
    S: ParentageStore + ?Sized,
{
    if !policy.enforce_gender || new_gender == cat.gender {
        return Ok(Verdict::Approved);
    }

    let edges = store.edges_by_parent(&cat.id)?;
    let conflicting: Vec<_> = edges
        .iter()
        .filter(|e| e.kind.required_gender() != new_gender)
        .collect();

    match conflicting.first() {
        None => Ok(Verdict::Approved),
        Some(first) => Ok(Verdict::Rejected(Rejection::GenderLocked {
            name: cat.name.clone(),
            kind: first.kind,
            count: conflicting.len(),
        })),
    }
}

/// Every cat reachable from `cat_id` by following parent links.
///
/// `cat_id` itself is only included if the stored graph already contains a
/// cycle through it.
pub fn ancestors_of<S>(store: &S, cat_id: &str) -> Result<HashSet<String>>
where
    S: ParentageStore + ?Sized,
{
    let mut visited = HashSet::new();
    let mut stack = vec![cat_id.to_string()];

    while let Some(current) = stack.pop() {
        for edge in store.edges_by_child(&current)? {
            if visited.insert(edge.parent_id.clone()) {
                stack.push(edge.parent_id);
            }
        }
    }

    Ok(visited)
}

/// Depth-first walk up from `descendant`, stopping as soon as `candidate` shows up.
fn is_ancestor<S>(store: &S, candidate: &str, descendant: &str) -> Result<bool>
where
    S: ParentageStore + ?Sized,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack = vec![descendant.to_string()];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        for edge in store.edges_by_child(&current)? {
            if edge.parent_id == candidate {
                return Ok(true);
            }
            if !visited.contains(&edge.parent_id) {
                stack.push(edge.parent_id);
            }
        }
    }

    Ok(false)
}
