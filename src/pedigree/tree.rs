//! Bounded, positioned pedigree materialization.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ParentKind, ParentageEdge};
use crate::catalog::Cat;
use crate::error::{CatteryError, Result};
use crate::store::{CatStore, ParentageStore};

/// 2D chart position. Generation 0 sits at the origin; ancestors go up (negative y).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Layout constants for the chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeLayout {
    /// Horizontal offset between the deepest generation and its child
    pub horizontal_spacing: f64,
    pub row_height: f64,
}

impl Default for TreeLayout {
    fn default() -> Self {
        Self {
            horizontal_spacing: 220.0,
            row_height: 160.0,
        }
    }
}

impl TreeLayout {
    /// Parent position for a child at `child_generation`.
    ///
    /// The offset doubles for every generation below the bound, so the
    /// `2^g` slots of generation `g` never share an x coordinate.
    fn parent_position(
        &self,
        child: Position,
        child_generation: usize,
        max_generations: usize,
        kind: ParentKind,
    ) -> Position {
        let exponent = max_generations.saturating_sub(child_generation + 1).min(62) as u32;
        let offset = self.horizontal_spacing * (1u64 << exponent) as f64;
        let x = match kind {
            ParentKind::Mother => child.x - offset,
            ParentKind::Father => child.x + offset,
        };
        Position::new(x, child.y - self.row_height)
    }
}

#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub max_generations: usize,
    pub layout: TreeLayout,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_generations: 5,
            layout: TreeLayout::default(),
            name: None,
            description: None,
        }
    }
}

impl TreeOptions {
    pub fn with_generations(max_generations: usize) -> Self {
        Self {
            max_generations,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Public view of the cat
    pub cat: Cat,
    pub generation: usize,
    pub position: Position,
    pub mother_id: Option<String>,
    pub father_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedigreeTreeView {
    pub root_cat_id: String,
    pub name: String,
    pub description: String,
    pub nodes: Vec<TreeNode>,
    /// Stored edges with both endpoints among `nodes`
    pub connections: Vec<ParentageEdge>,
    /// `max(node.generation) + 1`
    pub generations: usize,
}

impl PedigreeTreeView {
    pub fn node(&self, cat_id: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.cat.id == cat_id)
    }
}

/// A named tree kept as it was when saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPedigreeTree {
    pub root_cat_id: String,
    pub name: String,
    pub description: String,
    pub generations: usize,
    pub tree: PedigreeTreeView,
    pub saved_at: DateTime<Utc>,
}

impl SavedPedigreeTree {
    pub fn from_view(tree: PedigreeTreeView) -> Self {
        Self {
            root_cat_id: tree.root_cat_id.clone(),
            name: tree.name.clone(),
            description: tree.description.clone(),
            generations: tree.generations,
            tree,
            saved_at: Utc::now(),
        }
    }
}

struct Frame {
    cat_id: String,
    generation: usize,
    position: Position,
}

/// Build the pedigree view rooted at `root_id`.
///
/// Breadth-first, so a cat reachable along several lines of descent is
/// placed at its nearest generation. A parent reference to a cat that no
/// longer exists is skipped.
pub fn materialize<S>(store: &S, root_id: &str, options: &TreeOptions) -> Result<PedigreeTreeView>
where
    S: CatStore + ParentageStore + ?Sized,
{
    let root = store
        .get_cat(root_id)?
        .ok_or_else(|| CatteryError::CatNotFound(root_id.to_string()))?;

    let mut visited: HashSet<String> = HashSet::new();
    let mut present: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<Frame> = VecDeque::new();
    let mut nodes: Vec<TreeNode> = Vec::new();
    let mut candidate_edges: Vec<ParentageEdge> = Vec::new();

    queue.push_back(Frame {
        cat_id: root.id.clone(),
        generation: 0,
        position: Position::ORIGIN,
    });

    while let Some(frame) = queue.pop_front() {
        if !visited.insert(frame.cat_id.clone()) {
            continue;
        }

        let cat = match store.get_cat(&frame.cat_id)? {
            Some(cat) => cat,
            None => {
                log::warn!("Pedigree walk hit missing cat {}, skipping", frame.cat_id);
                continue;
            }
        };

        let parent_edges = store.edges_by_child(&cat.id)?;
        let mut mother_id = None;
        let mut father_id = None;

        for edge in &parent_edges {
            if !store.cat_exists(&edge.parent_id)? {
                log::warn!(
                    "Cat {} has a {} link to missing cat {}, skipping",
                    cat.id,
                    edge.kind,
                    edge.parent_id
                );
                continue;
            }
            match edge.kind {
                ParentKind::Mother => mother_id = Some(edge.parent_id.clone()),
                ParentKind::Father => father_id = Some(edge.parent_id.clone()),
            }

            if frame.generation < options.max_generations && !visited.contains(&edge.parent_id) {
                queue.push_back(Frame {
                    cat_id: edge.parent_id.clone(),
                    generation: frame.generation + 1,
                    position: options.layout.parent_position(
                        frame.position,
                        frame.generation,
                        options.max_generations,
                        edge.kind,
                    ),
                });
            }
        }

        candidate_edges.extend(parent_edges);
        present.insert(cat.id.clone());
        nodes.push(TreeNode {
            cat: cat.public_view(),
            generation: frame.generation,
            position: frame.position,
            mother_id,
            father_id,
        });
    }

    let connections: Vec<ParentageEdge> = candidate_edges
        .into_iter()
        .filter(|e| present.contains(&e.parent_id) && present.contains(&e.child_id))
        .collect();

    nodes.sort_by(|a, b| {
        a.generation
            .cmp(&b.generation)
            .then_with(|| a.position.x.total_cmp(&b.position.x))
    });

    let generations = nodes.iter().map(|n| n.generation).max().unwrap_or(0) + 1;
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| format!("{} pedigree", root.name));
    let description = options.description.clone().unwrap_or_else(|| {
        format!("{} generation(s) of recorded ancestry for {}", generations, root.name)
    });

    log::debug!(
        "Materialized pedigree for {}: {} nodes, {} connections",
        root.id,
        nodes.len(),
        connections.len()
    );

    Ok(PedigreeTreeView {
        root_cat_id: root.id,
        name,
        description,
        nodes,
        connections,
        generations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Gender, NewCat};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn add(store: &MemoryStore, name: &str, gender: Gender) -> Cat {
        let cat = Cat::from_new(NewCat::new(name, gender, NaiveDate::from_ymd_opt(2019, 3, 3).unwrap())).unwrap();
        store.insert_cat(&cat).unwrap();
        cat
    }

    /// Straight maternal line: gen0 <- gen1 <- gen2 <- gen3 <- gen4
    fn maternal_line(store: &MemoryStore) -> Vec<Cat> {
        let line: Vec<Cat> = (0..5).map(|i| add(store, &format!("Gen{}", i), Gender::Female)).collect();
        for pair in line.windows(2) {
            store.insert_edge(&pair[1].id, &pair[0].id, ParentKind::Mother).unwrap();
        }
        line
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let store = MemoryStore::new();
        let err = materialize(&store, "nobody", &TreeOptions::default()).unwrap_err();
        assert!(matches!(err, CatteryError::CatNotFound(_)));
    }

    #[test]
    fn test_generation_bound() {
        let store = MemoryStore::new();
        let line = maternal_line(&store);

        let view = materialize(&store, &line[0].id, &TreeOptions::with_generations(2)).unwrap();
        let generations: Vec<usize> = view.nodes.iter().map(|n| n.generation).collect();
        assert_eq!(generations, vec![0, 1, 2]);
        assert_eq!(view.generations, 3);
        assert!(view.node(&line[3].id).is_none());
    }

    #[test]
    fn test_connections_are_induced() {
        let store = MemoryStore::new();
        let line = maternal_line(&store);

        let view = materialize(&store, &line[0].id, &TreeOptions::with_generations(2)).unwrap();
        assert_eq!(view.connections.len(), 2);
        for edge in &view.connections {
            assert!(view.node(&edge.parent_id).is_some());
            assert!(view.node(&edge.child_id).is_some());
        }
        // Gen2 still reports its mother even though she is out of bounds
        assert_eq!(view.node(&line[2].id).unwrap().mother_id.as_deref(), Some(line[3].id.as_str()));
    }

    #[test]
    fn test_positions_fan_out() {
        let store = MemoryStore::new();
        let luna = add(&store, "Luna", Gender::Female);
        let bella = add(&store, "Bella", Gender::Female);
        let oliver = add(&store, "Oliver", Gender::Male);
        let granny = add(&store, "Granny", Gender::Female);
        let grandpa = add(&store, "Grandpa", Gender::Male);
        store.insert_edge(&bella.id, &luna.id, ParentKind::Mother).unwrap();
        store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();
        store.insert_edge(&granny.id, &bella.id, ParentKind::Mother).unwrap();
        store.insert_edge(&grandpa.id, &oliver.id, ParentKind::Father).unwrap();

        let options = TreeOptions {
            max_generations: 2,
            layout: TreeLayout { horizontal_spacing: 100.0, row_height: 50.0 },
            ..TreeOptions::default()
        };
        let view = materialize(&store, &luna.id, &options).unwrap();

        assert_eq!(view.node(&luna.id).unwrap().position, Position::ORIGIN);
        assert_eq!(view.node(&bella.id).unwrap().position, Position::new(-200.0, -50.0));
        assert_eq!(view.node(&oliver.id).unwrap().position, Position::new(200.0, -50.0));
        assert_eq!(view.node(&granny.id).unwrap().position, Position::new(-300.0, -100.0));
        assert_eq!(view.node(&grandpa.id).unwrap().position, Position::new(300.0, -100.0));

        let xs: HashSet<i64> = view.nodes.iter().map(|n| n.position.x as i64).collect();
        assert_eq!(xs.len(), view.nodes.len());
    }

    #[test]
    fn test_shared_ancestor_appears_once_at_nearest_generation() {
        let store = MemoryStore::new();
        let kit = add(&store, "Kit", Gender::Female);
        let mum = add(&store, "Mum", Gender::Female);
        let dad = add(&store, "Dad", Gender::Male);
        store.insert_edge(&mum.id, &kit.id, ParentKind::Mother).unwrap();
        store.insert_edge(&dad.id, &kit.id, ParentKind::Father).unwrap();
        // Dad is also Mum's father
        store.insert_edge(&dad.id, &mum.id, ParentKind::Father).unwrap();

        let view = materialize(&store, &kit.id, &TreeOptions::default()).unwrap();
        assert_eq!(view.nodes.len(), 3);
        assert_eq!(view.node(&dad.id).unwrap().generation, 1);
        assert_eq!(view.connections.len(), 3);
    }

    #[test]
    fn test_terminates_on_corrupt_cycle_and_skips_missing() {
        let store = MemoryStore::new();
        let a = add(&store, "A", Gender::Male);
        let b = add(&store, "B", Gender::Male);
        store.insert_edge_unchecked(ParentageEdge::new(&b.id, &a.id, ParentKind::Father)).unwrap();
        store.insert_edge_unchecked(ParentageEdge::new(&a.id, &b.id, ParentKind::Father)).unwrap();
        store.insert_edge_unchecked(ParentageEdge::new("deleted-cat", &a.id, ParentKind::Mother)).unwrap();

        let view = materialize(&store, &a.id, &TreeOptions::with_generations(10)).unwrap();
        assert_eq!(view.nodes.len(), 2);
        assert!(view.connections.iter().all(|e| e.parent_id != "deleted-cat"));
    }

    #[test]
    fn test_parent_ids_only_for_existing_parents() {
        let store = MemoryStore::new();
        let luna = add(&store, "Luna", Gender::Female);
        let bella = add(&store, "Bella", Gender::Female);
        let ghost = add(&store, "Ghost", Gender::Male);
        store.insert_edge(&bella.id, &luna.id, ParentKind::Mother).unwrap();
        store.insert_edge(&ghost.id, &luna.id, ParentKind::Father).unwrap();
        store.delete_cat(&ghost.id).unwrap();

        let view = materialize(&store, &luna.id, &TreeOptions::default()).unwrap();
        let root = view.node(&luna.id).unwrap();
        assert_eq!(root.mother_id.as_deref(), Some(bella.id.as_str()));
        assert!(root.father_id.is_none());
        assert_eq!(view.nodes.len(), 2);
        assert_eq!(view.connections.len(), 1);
    }

    #[test]
    fn test_public_view_and_default_names() {
        let store = MemoryStore::new();
        let mut input = NewCat::new("Solo", Gender::Male, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        input.internal_notes = Some("private".into());
        let solo = Cat::from_new(input).unwrap();
        store.insert_cat(&solo).unwrap();

        let view = materialize(&store, &solo.id, &TreeOptions::default()).unwrap();
        assert_eq!(view.generations, 1);
        assert_eq!(view.name, "Solo pedigree");
        assert!(view.nodes[0].cat.internal_notes.is_none());
        assert!(view.connections.is_empty());
    }
}
