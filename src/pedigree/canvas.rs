//! Interactive canvas adapter.
//!
//! Turns editor gestures (drag a cat in, move it, connect two cats) into
//! validated store mutations. The canvas holds only view state: which cats
//! are shown and where, and whether a connection is pending. Everything it
//! writes goes straight to the store, so after each call the canvas and the
//! store agree.

use serde::{Deserialize, Serialize};

use super::rules::{validate_edge, Rejection, RulePolicy, Verdict};
use super::tree::{PedigreeTreeView, Position};
use super::{ParentKind, ParentageEdge, ProposedEdge};
use crate::catalog::Cat;
use crate::config::PedigreeConfig;
use crate::error::{CatteryError, Result};
use crate::store::{CatStore, ParentageStore};

/// What "remove from canvas" does to stored edges. The cat record itself is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Removing a node only changes the view
    #[default]
    KeepEdges,
    /// Removing a node also deletes every edge touching the cat
    DeleteEdges,
}

/// Host UI callbacks
pub trait CanvasObserver {
    fn on_connection_rejected(&mut self, reason: &str);
    fn on_connection_created(&mut self, parent: &Cat, child: &Cat, kind: ParentKind);
    fn on_cat_already_present(&mut self, cat: &Cat);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasNode {
    pub cat: Cat,
    pub position: Position,
}

/// Raw gesture input from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gesture", rename_all = "snake_case")]
pub enum Gesture {
    DragStart { cat_id: String, position: Position },
    DragMove { position: Position },
    Drop { position: Position },
    ConnectClick { cat_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed { edges_removed: usize },
    NotOnCanvas,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Created(ParentageEdge),
    Rejected(Rejection),
    /// Clicked cat is not shown; nothing was written
    NotOnCanvas,
    /// Click with no connection pending
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    Nothing,
    Moved,
    Added(AddOutcome),
    Connection(ConnectOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Idle,
    Connecting { from: String, kind: ParentKind },
}

#[derive(Debug, Clone)]
struct Drag {
    cat_id: String,
}

pub struct Canvas<O> {
    nodes: Vec<CanvasNode>,
    mode: Mode,
    drag: Option<Drag>,
    policy: RulePolicy,
    removal: RemovalPolicy,
    observer: O,
}

impl<O: CanvasObserver> Canvas<O> {
    pub fn new(observer: O, policy: RulePolicy, removal: RemovalPolicy) -> Self {
        Self {
            nodes: Vec::new(),
            mode: Mode::Idle,
            drag: None,
            policy,
            removal,
            observer,
        }
    }

    /// Canvas using the configured rule and removal policies
    pub fn from_config(observer: O, config: &PedigreeConfig) -> Self {
        Self::new(observer, config.rule_policy(), config.canvas_removal)
    }

    pub fn nodes(&self) -> &[CanvasNode] {
        &self.nodes
    }

    pub fn contains(&self, cat_id: &str) -> bool {
        self.nodes.iter().any(|n| n.cat.id == cat_id)
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn pending_connection(&self) -> Option<(&str, ParentKind)> {
        match &self.mode {
            Mode::Idle => None,
            Mode::Connecting { from, kind } => Some((from.as_str(), *kind)),
        }
    }

    /// Place every node of a materialized tree on the canvas at its chart position.
    /// Returns how many cats were newly added.
    pub fn open_tree(&mut self, view: &PedigreeTreeView) -> usize {
        let mut added = 0;
        for node in &view.nodes {
            if !self.contains(&node.cat.id) {
                self.nodes.push(CanvasNode {
                    cat: node.cat.clone(),
                    position: node.position,
                });
                added += 1;
            }
        }
        added
    }

    /// Show a cat on the canvas. Adding a cat that is already shown is a no-op.
    pub fn add_cat<S>(&mut self, store: &S, cat_id: &str, position: Position) -> Result<AddOutcome>
    where
        S: CatStore + ?Sized,
    {
        if let Some(node) = self.nodes.iter().find(|n| n.cat.id == cat_id) {
            self.observer.on_cat_already_present(&node.cat);
            return Ok(AddOutcome::AlreadyPresent);
        }

        let cat = store
            .get_cat(cat_id)?
            .ok_or_else(|| CatteryError::CatNotFound(cat_id.to_string()))?;
        self.nodes.push(CanvasNode { cat, position });
        Ok(AddOutcome::Added)
    }

    /// Take a cat off the canvas. Edges are deleted only under `RemovalPolicy::DeleteEdges`.
    pub fn remove_cat<S>(&mut self, store: &S, cat_id: &str) -> Result<RemoveOutcome>
    where
        S: ParentageStore + ?Sized,
    {
        let Some(index) = self.nodes.iter().position(|n| n.cat.id == cat_id) else {
            return Ok(RemoveOutcome::NotOnCanvas);
        };

        let edges_removed = match self.removal {
            RemovalPolicy::KeepEdges => 0,
            RemovalPolicy::DeleteEdges => store.delete_all_edges_for(cat_id)?,
        };

        self.nodes.remove(index);
        if matches!(&self.mode, Mode::Connecting { from, .. } if from == cat_id) {
            self.mode = Mode::Idle;
        }
        if self.drag.as_ref().is_some_and(|d| d.cat_id == cat_id) {
            self.drag = None;
        }
        Ok(RemoveOutcome::Removed { edges_removed })
    }

    pub fn move_cat(&mut self, cat_id: &str, position: Position) -> bool {
        match self.nodes.iter_mut().find(|n| n.cat.id == cat_id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    /// Enter connecting mode: the next clicked cat becomes the child of `from_cat_id`.
    pub fn begin_connection(&mut self, from_cat_id: &str, kind: ParentKind) -> Result<()> {
        if !self.contains(from_cat_id) {
            return Err(CatteryError::InvalidInput(format!(
                "cat {} is not on the canvas",
                from_cat_id
            )));
        }
        self.mode = Mode::Connecting {
            from: from_cat_id.to_string(),
            kind,
        };
        Ok(())
    }

    /// Abandon a pending connection. Returns false if none was pending.
    pub fn cancel_connection(&mut self) -> bool {
        let was_pending = self.mode != Mode::Idle;
        self.mode = Mode::Idle;
        was_pending
    }

    /// Complete a pending connection with `cat_id` as the child.
    ///
    /// The pending connection ends either way; on rejection the host gets the reason.
    pub fn click_cat<S>(&mut self, store: &S, cat_id: &str) -> Result<ConnectOutcome>
    where
        S: CatStore + ParentageStore + ?Sized,
    {
        let (from, kind) = match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Idle => return Ok(ConnectOutcome::Ignored),
            Mode::Connecting { from, kind } => (from, kind),
        };

        if !self.contains(cat_id) {
            self.observer
                .on_connection_rejected(&format!("cat {} is not on the canvas", cat_id));
            return Ok(ConnectOutcome::NotOnCanvas);
        }

        let proposed = ProposedEdge::new(from, cat_id, kind);
        match self.commit(store, &proposed) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.observer.on_connection_rejected(&e.to_string());
                Err(e)
            }
        }
    }

    fn commit<S>(&mut self, store: &S, proposed: &ProposedEdge) -> Result<ConnectOutcome>
    where
        S: CatStore + ParentageStore + ?Sized,
    {
        if let Verdict::Rejected(rejection) = validate_edge(store, proposed, &self.policy)? {
            log::debug!("Canvas connection rejected: {}", rejection);
            self.observer.on_connection_rejected(&rejection.reason());
            return Ok(ConnectOutcome::Rejected(rejection));
        }

        let edge = store.insert_edge(&proposed.parent_id, &proposed.child_id, proposed.kind)?;
        if let (Some(parent), Some(child)) = (
            store.get_cat(&proposed.parent_id)?,
            store.get_cat(&proposed.child_id)?,
        ) {
            self.observer.on_connection_created(&parent, &child, proposed.kind);
        }
        Ok(ConnectOutcome::Created(edge))
    }

    /// Delete a stored edge from the editor
    pub fn disconnect<S>(&mut self, store: &S, edge_id: &str) -> Result<()>
    where
        S: ParentageStore + ?Sized,
    {
        if store.delete_edge(edge_id)? {
            Ok(())
        } else {
            Err(CatteryError::EdgeNotFound(edge_id.to_string()))
        }
    }

    /// Stored edges between cats that are both on the canvas
    pub fn connections<S>(&self, store: &S) -> Result<Vec<ParentageEdge>>
    where
        S: ParentageStore + ?Sized,
    {
        let mut edges = Vec::new();
        for node in &self.nodes {
            for edge in store.edges_by_child(&node.cat.id)? {
                if self.contains(&edge.parent_id) {
                    edges.push(edge);
                }
            }
        }
        Ok(edges)
    }

    /// Feed one gesture from the host
    pub fn handle<S>(&mut self, store: &S, gesture: Gesture) -> Result<GestureOutcome>
    where
        S: CatStore + ParentageStore + ?Sized,
    {
        match gesture {
            Gesture::DragStart { cat_id, position: _ } => {
                self.drag = Some(Drag { cat_id });
                Ok(GestureOutcome::Nothing)
            }
            Gesture::DragMove { position } => {
                let Some(drag) = &self.drag else {
                    return Ok(GestureOutcome::Nothing);
                };
                let cat_id = drag.cat_id.clone();
                if self.move_cat(&cat_id, position) {
                    Ok(GestureOutcome::Moved)
                } else {
                    Ok(GestureOutcome::Nothing)
                }
            }
            Gesture::Drop { position } => {
                let Some(drag) = self.drag.take() else {
                    return Ok(GestureOutcome::Nothing);
                };
                if self.move_cat(&drag.cat_id, position) {
                    Ok(GestureOutcome::Moved)
                } else {
                    // Dragged in from the cat list
                    self.add_cat(store, &drag.cat_id, position).map(GestureOutcome::Added)
                }
            }
            Gesture::ConnectClick { cat_id } => {
                self.click_cat(store, &cat_id).map(GestureOutcome::Connection)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Gender, NewCat};
    use crate::pedigree::{materialize, TreeOptions};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl CanvasObserver for Recorder {
        fn on_connection_rejected(&mut self, reason: &str) {
            self.events.push(format!("rejected: {}", reason));
        }

        fn on_connection_created(&mut self, parent: &Cat, child: &Cat, kind: ParentKind) {
            self.events.push(format!("created: {} {} of {}", parent.name, kind, child.name));
        }

        fn on_cat_already_present(&mut self, cat: &Cat) {
            self.events.push(format!("present: {}", cat.name));
        }
    }

    fn add(store: &MemoryStore, name: &str, gender: Gender) -> Cat {
        let cat = Cat::from_new(NewCat::new(name, gender, NaiveDate::from_ymd_opt(2021, 9, 9).unwrap())).unwrap();
        store.insert_cat(&cat).unwrap();
        cat
    }

    fn canvas(removal: RemovalPolicy) -> Canvas<Recorder> {
        Canvas::new(Recorder::default(), RulePolicy::default(), removal)
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = MemoryStore::new();
        let luna = add(&store, "Luna", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);

        assert_eq!(canvas.add_cat(&store, &luna.id, Position::ORIGIN).unwrap(), AddOutcome::Added);
        assert_eq!(
            canvas.add_cat(&store, &luna.id, Position::new(5.0, 5.0)).unwrap(),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(canvas.nodes().len(), 1);
        assert_eq!(canvas.nodes()[0].position, Position::ORIGIN);
        assert_eq!(canvas.observer().events, vec!["present: Luna".to_string()]);
    }

    #[test]
    fn test_add_unknown_cat() {
        let store = MemoryStore::new();
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        assert!(matches!(
            canvas.add_cat(&store, "ghost", Position::ORIGIN),
            Err(CatteryError::CatNotFound(_))
        ));
    }

    #[test]
    fn test_connect_success_notifies_and_commits() {
        let store = MemoryStore::new();
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        canvas.add_cat(&store, &oliver.id, Position::ORIGIN).unwrap();
        canvas.add_cat(&store, &luna.id, Position::new(0.0, 100.0)).unwrap();

        canvas.begin_connection(&oliver.id, ParentKind::Father).unwrap();
        assert_eq!(canvas.pending_connection(), Some((oliver.id.as_str(), ParentKind::Father)));

        let outcome = canvas.click_cat(&store, &luna.id).unwrap();
        assert!(matches!(outcome, ConnectOutcome::Created(_)));
        assert!(canvas.pending_connection().is_none());
        assert_eq!(canvas.observer().events, vec!["created: Oliver father of Luna".to_string()]);
        assert_eq!(canvas.connections(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_rejected_connection_cancels_pending() {
        let store = MemoryStore::new();
        let bella = add(&store, "Bella", Gender::Female);
        let luna = add(&store, "Luna", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        canvas.add_cat(&store, &bella.id, Position::ORIGIN).unwrap();
        canvas.add_cat(&store, &luna.id, Position::new(0.0, 100.0)).unwrap();

        canvas.begin_connection(&bella.id, ParentKind::Father).unwrap();
        let outcome = canvas.click_cat(&store, &luna.id).unwrap();

        assert!(matches!(outcome, ConnectOutcome::Rejected(Rejection::GenderMismatch { .. })));
        assert!(canvas.pending_connection().is_none());
        assert!(canvas.observer().events[0].starts_with("rejected: Bella cannot be a father"));
        assert!(store.list_edges().unwrap().is_empty());
    }

    #[test]
    fn test_click_without_pending_is_ignored() {
        let store = MemoryStore::new();
        let luna = add(&store, "Luna", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        assert_eq!(canvas.click_cat(&store, &luna.id).unwrap(), ConnectOutcome::Ignored);
        assert!(!canvas.cancel_connection());
    }

    #[test]
    fn test_click_on_cat_off_canvas_writes_nothing() {
        let store = MemoryStore::new();
        let tom = add(&store, "Tom", Gender::Male);
        let kit = add(&store, "Kit", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        canvas.add_cat(&store, &tom.id, Position::ORIGIN).unwrap();

        canvas.begin_connection(&tom.id, ParentKind::Father).unwrap();
        assert_eq!(canvas.click_cat(&store, &kit.id).unwrap(), ConnectOutcome::NotOnCanvas);

        assert!(canvas.pending_connection().is_none());
        assert!(store.list_edges().unwrap().is_empty());
        assert!(canvas.connections(&store).unwrap().is_empty());
        assert_eq!(
            canvas.observer().events,
            vec![format!("rejected: cat {} is not on the canvas", kit.id)]
        );
    }

    #[test]
    fn test_from_config_uses_configured_removal() {
        let store = MemoryStore::new();
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();

        let config: PedigreeConfig = toml::from_str("canvas_removal = \"delete_edges\"").unwrap();
        let mut configured = Canvas::from_config(Recorder::default(), &config);
        configured.add_cat(&store, &oliver.id, Position::ORIGIN).unwrap();
        assert_eq!(
            configured.remove_cat(&store, &oliver.id).unwrap(),
            RemoveOutcome::Removed { edges_removed: 1 }
        );
        assert!(store.list_edges().unwrap().is_empty());

        store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();
        let mut defaulted = Canvas::from_config(Recorder::default(), &PedigreeConfig::default());
        defaulted.add_cat(&store, &oliver.id, Position::ORIGIN).unwrap();
        assert_eq!(
            defaulted.remove_cat(&store, &oliver.id).unwrap(),
            RemoveOutcome::Removed { edges_removed: 0 }
        );
        assert_eq!(store.list_edges().unwrap().len(), 1);
    }

    #[test]
    fn test_begin_requires_cat_on_canvas() {
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        assert!(canvas.begin_connection("absent", ParentKind::Mother).is_err());
    }

    #[test]
    fn test_remove_keep_edges_vs_delete_edges() {
        let store = MemoryStore::new();
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();

        let mut keep = canvas(RemovalPolicy::KeepEdges);
        keep.add_cat(&store, &oliver.id, Position::ORIGIN).unwrap();
        assert_eq!(
            keep.remove_cat(&store, &oliver.id).unwrap(),
            RemoveOutcome::Removed { edges_removed: 0 }
        );
        assert_eq!(store.list_edges().unwrap().len(), 1);
        assert_eq!(keep.remove_cat(&store, &oliver.id).unwrap(), RemoveOutcome::NotOnCanvas);

        let mut purge = canvas(RemovalPolicy::DeleteEdges);
        purge.add_cat(&store, &oliver.id, Position::ORIGIN).unwrap();
        assert_eq!(
            purge.remove_cat(&store, &oliver.id).unwrap(),
            RemoveOutcome::Removed { edges_removed: 1 }
        );
        assert!(store.list_edges().unwrap().is_empty());
        // Record survives either way
        assert!(store.get_cat(&oliver.id).unwrap().is_some());
    }

    #[test]
    fn test_gestures_drag_in_move_and_connect() {
        let store = MemoryStore::new();
        let bella = add(&store, "Bella", Gender::Female);
        let luna = add(&store, "Luna", Gender::Female);
        let mut canvas = canvas(RemovalPolicy::KeepEdges);

        let drop_at = Position::new(40.0, 60.0);
        canvas
            .handle(&store, Gesture::DragStart { cat_id: bella.id.clone(), position: Position::ORIGIN })
            .unwrap();
        let outcome = canvas.handle(&store, Gesture::Drop { position: drop_at }).unwrap();
        assert_eq!(outcome, GestureOutcome::Added(AddOutcome::Added));

        canvas
            .handle(&store, Gesture::DragStart { cat_id: bella.id.clone(), position: drop_at })
            .unwrap();
        let moved = canvas
            .handle(&store, Gesture::DragMove { position: Position::new(80.0, 60.0) })
            .unwrap();
        assert_eq!(moved, GestureOutcome::Moved);
        canvas.handle(&store, Gesture::Drop { position: Position::new(90.0, 60.0) }).unwrap();
        assert_eq!(canvas.nodes()[0].position, Position::new(90.0, 60.0));
        assert_eq!(canvas.handle(&store, Gesture::Drop { position: drop_at }).unwrap(), GestureOutcome::Nothing);

        canvas.add_cat(&store, &luna.id, Position::new(40.0, 200.0)).unwrap();
        canvas.begin_connection(&bella.id, ParentKind::Mother).unwrap();
        let connected = canvas
            .handle(&store, Gesture::ConnectClick { cat_id: luna.id.clone() })
            .unwrap();
        assert!(matches!(connected, GestureOutcome::Connection(ConnectOutcome::Created(_))));
    }

    #[test]
    fn test_editor_session_over_sqlite() {
        use crate::db::{migrate, Db};
        use crate::store::SqliteStore;
        use std::path::Path;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("canvas.db"));
        let mut conn = db.open_connection().unwrap();
        migrate::run_migrations(&mut conn, &Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).unwrap();
        let store = SqliteStore::new(&conn);

        let born = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let tom = Cat::from_new(NewCat::new("Tom", Gender::Male, born)).unwrap();
        let kit = Cat::from_new(NewCat::new("Kit", Gender::Female, born)).unwrap();
        store.insert_cat(&tom).unwrap();
        store.insert_cat(&kit).unwrap();

        let mut canvas = canvas(RemovalPolicy::DeleteEdges);
        canvas.add_cat(&store, &tom.id, Position::ORIGIN).unwrap();
        canvas.add_cat(&store, &kit.id, Position::new(0.0, 160.0)).unwrap();
        canvas.begin_connection(&tom.id, ParentKind::Father).unwrap();
        assert!(matches!(canvas.click_cat(&store, &kit.id).unwrap(), ConnectOutcome::Created(_)));
        assert_eq!(store.edges_by_child(&kit.id).unwrap().len(), 1);

        canvas.begin_connection(&kit.id, ParentKind::Mother).unwrap();
        assert!(matches!(
            canvas.click_cat(&store, &tom.id).unwrap(),
            ConnectOutcome::Rejected(_)
        ));

        canvas.remove_cat(&store, &tom.id).unwrap();
        assert!(store.edges_by_child(&kit.id).unwrap().is_empty());
    }

    #[test]
    fn test_open_tree_and_disconnect() {
        let store = MemoryStore::new();
        let oliver = add(&store, "Oliver", Gender::Male);
        let luna = add(&store, "Luna", Gender::Female);
        let edge = store.insert_edge(&oliver.id, &luna.id, ParentKind::Father).unwrap();

        let view = materialize(&store, &luna.id, &TreeOptions::default()).unwrap();
        let mut canvas = canvas(RemovalPolicy::KeepEdges);
        assert_eq!(canvas.open_tree(&view), 2);
        assert_eq!(canvas.open_tree(&view), 0);
        assert_eq!(canvas.connections(&store).unwrap(), vec![edge.clone()]);

        canvas.disconnect(&store, &edge.edge_id).unwrap();
        assert!(canvas.connections(&store).unwrap().is_empty());
        assert!(matches!(
            canvas.disconnect(&store, &edge.edge_id),
            Err(CatteryError::EdgeNotFound(_))
        ));
    }
}
