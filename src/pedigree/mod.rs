//! Pedigree graph: typed parent edges over cats, the rules that keep the graph
//! consistent, and the bounded tree materializer.
//!
//! Edges point from parent to child. Walks go the other way (child -> parent)
//! and always carry an explicit visited set, so a corrupted store can slow a
//! walk down but never loop it.

mod canvas;
mod cascade;
mod relations;
mod rules;
mod tree;

pub use canvas::{
    AddOutcome, Canvas, CanvasNode, CanvasObserver, ConnectOutcome, Gesture, GestureOutcome,
    RemovalPolicy, RemoveOutcome,
};
pub use cascade::{delete_cat, find_dangling, sweep, CascadeReport, DanglingReport};
pub use relations::{children_of, link_parent, parents_of, ChildLink, Parents};
pub use rules::{ancestors_of, check_gender_change, validate_edge, Rejection, RulePolicy, Verdict};
pub use tree::{
    materialize, PedigreeTreeView, Position, SavedPedigreeTree, TreeLayout, TreeNode, TreeOptions,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::catalog::Gender;
use crate::error::{CatteryError, Result};

/// Which parent slot an edge fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
    Mother,
    Father,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentKind::Mother => "mother",
            ParentKind::Father => "father",
        }
    }

    /// Gender a parent in this slot must have
    pub fn required_gender(&self) -> Gender {
        match self {
            ParentKind::Mother => Gender::Female,
            ParentKind::Father => Gender::Male,
        }
    }

    pub fn other(&self) -> ParentKind {
        match self {
            ParentKind::Mother => ParentKind::Father,
            ParentKind::Father => ParentKind::Mother,
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParentKind {
    type Err = CatteryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mother" => Ok(ParentKind::Mother),
            "father" => Ok(ParentKind::Father),
            other => Err(CatteryError::InvalidInput(format!("unknown relation type: {}", other))),
        }
    }
}

/// A stored parent -> child relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentageEdge {
    pub edge_id: String,
    pub parent_id: String,
    pub child_id: String,
    #[serde(rename = "type")]
    pub kind: ParentKind,
    pub created_at: DateTime<Utc>,
}

impl ParentageEdge {
    pub fn new(parent_id: &str, child_id: &str, kind: ParentKind) -> Self {
        Self {
            edge_id: Uuid::new_v4().to_string(),
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
            kind,
            created_at: Utc::now(),
        }
    }

    pub fn touches(&self, cat_id: &str) -> bool {
        self.parent_id == cat_id || self.child_id == cat_id
    }
}

/// An edge somebody wants to insert, before the rules engine has seen it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedEdge {
    pub parent_id: String,
    pub child_id: String,
    #[serde(rename = "type")]
    pub kind: ParentKind,
}

impl ProposedEdge {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>, kind: ParentKind) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            kind,
        }
    }
}
