//! Change feed: one broadcast event per committed mutation.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::pedigree::ParentKind;

/// Buffered events per subscriber before a slow subscriber starts lagging
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    CatCreated { cat_id: String },
    CatUpdated { cat_id: String },
    CatDeleted { cat_id: String, edges_removed: usize },
    EdgeCreated { edge_id: String, parent_id: String, child_id: String, kind: ParentKind },
    EdgeDeleted { edge_id: String, parent_id: String, child_id: String, kind: ParentKind },
    SnapshotSaved { root_cat_id: String },
    SnapshotDeleted { root_cat_id: String },
    SweepCompleted { edges_removed: usize, snapshots_removed: usize },
    SiteContentChanged { section: String },
}

impl ChangeEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::CatCreated { .. } => "cat_created",
            ChangeEvent::CatUpdated { .. } => "cat_updated",
            ChangeEvent::CatDeleted { .. } => "cat_deleted",
            ChangeEvent::EdgeCreated { .. } => "edge_created",
            ChangeEvent::EdgeDeleted { .. } => "edge_deleted",
            ChangeEvent::SnapshotSaved { .. } => "snapshot_saved",
            ChangeEvent::SnapshotDeleted { .. } => "snapshot_deleted",
            ChangeEvent::SweepCompleted { .. } => "sweep_completed",
            ChangeEvent::SiteContentChanged { .. } => "site_content_changed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Nobody listening is fine.
    pub fn publish(&self, event: ChangeEvent) {
        log::debug!("Change event: {}", event.name());
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
