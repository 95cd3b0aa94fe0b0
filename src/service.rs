//! Async façade over the SQLite database.
//!
//! Each operation is one blocking connection task. Writes run inside an
//! immediate transaction, so the rule check for an edge and the insert it
//! guards see the same graph even with several writers.

use std::collections::BTreeMap;

use rusqlite::TransactionBehavior;
use serde::Deserialize;

use crate::catalog::{Cat, CatPatch, Category, NewCat};
use crate::config::{Config, PedigreeConfig, MAX_GENERATIONS_LIMIT};
use crate::db::Db;
use crate::error::{CatteryError, Result};
use crate::events::{ChangeEvent, ChangeFeed};
use crate::pedigree::{
    self, check_gender_change, ChildLink, DanglingReport, CascadeReport, ParentageEdge, Parents,
    PedigreeTreeView, ProposedEdge, SavedPedigreeTree, TreeOptions,
};
use crate::site::{self, NewReservation, NewVideo, Reservation, ReservationStatus, TikTokVideo, VideoPatch};
use crate::store::{CatStore, ParentageStore, SnapshotStore, SqliteStore};

/// Admin request to save the current tree of a cat
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveTreeRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub generations: Option<usize>,
}

#[derive(Clone)]
pub struct Cattery {
    db: Db,
    pedigree: PedigreeConfig,
    feed: ChangeFeed,
}

impl Cattery {
    pub fn new(db: Db, pedigree: PedigreeConfig) -> Self {
        Self {
            db,
            pedigree,
            feed: ChangeFeed::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Db::new(config.db_path()), config.pedigree.clone())
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db
            .with_connection(move |conn| f(&SqliteStore::new(conn)))
            .await
    }

    async fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = f(&SqliteStore::new(&tx))?;
                tx.commit()?;
                Ok(value)
            })
            .await
    }

    fn tree_options(&self, generations: Option<usize>) -> Result<TreeOptions> {
        let max_generations = generations.unwrap_or(self.pedigree.max_generations);
        if max_generations == 0 || max_generations > MAX_GENERATIONS_LIMIT {
            return Err(CatteryError::InvalidInput(format!(
                "generations must be between 1 and {}",
                MAX_GENERATIONS_LIMIT
            )));
        }
        Ok(TreeOptions {
            max_generations,
            layout: self.pedigree.layout(),
            ..TreeOptions::default()
        })
    }

    // ---- cats ----

    /// Displayed cats in a public category, internal notes stripped
    pub async fn public_cats(&self, category: Option<Category>) -> Result<Vec<Cat>> {
        let filter = category.unwrap_or(Category::All);
        let cats = self.read(|store| store.list_cats()).await?;
        Ok(cats
            .iter()
            .filter(|c| c.is_displayed && c.in_category(filter))
            .map(Cat::public_view)
            .collect())
    }

    /// A displayed cat; hidden cats read as not found
    pub async fn public_cat(&self, id: &str) -> Result<Cat> {
        let cat = self.cat(id).await?;
        if !cat.is_displayed {
            return Err(CatteryError::CatNotFound(id.to_string()));
        }
        Ok(cat.public_view())
    }

    pub async fn cats(&self) -> Result<Vec<Cat>> {
        self.read(|store| store.list_cats()).await
    }

    pub async fn cat(&self, id: &str) -> Result<Cat> {
        let id = id.to_string();
        self.read(move |store| store.get_cat(&id)?.ok_or(CatteryError::CatNotFound(id)))
            .await
    }

    pub async fn create_cat(&self, input: NewCat) -> Result<Cat> {
        let cat = Cat::from_new(input)?;
        let stored = cat.clone();
        self.write(move |store| store.insert_cat(&stored)).await?;

        log::info!("Created cat {} ({})", cat.name, cat.id);
        self.feed.publish(ChangeEvent::CatCreated { cat_id: cat.id.clone() });
        Ok(cat)
    }

    /// Apply an admin edit. A gender change that would break a recorded
    /// parent slot is rejected.
    pub async fn update_cat(&self, id: &str, patch: CatPatch) -> Result<Cat> {
        let id = id.to_string();
        let policy = self.pedigree.rule_policy();
        let cat = self
            .write(move |store| {
                let mut cat = store
                    .get_cat(&id)?
                    .ok_or_else(|| CatteryError::CatNotFound(id.clone()))?;
                if let Some(gender) = patch.gender {
                    check_gender_change(store, &cat, gender, &policy)?.into_result()?;
                }
                cat.apply_patch(patch)?;
                store.save_cat(&cat)?;
                Ok(cat)
            })
            .await?;

        self.feed.publish(ChangeEvent::CatUpdated { cat_id: cat.id.clone() });
        Ok(cat)
    }

    /// Show or hide several cats at once. Unknown ids fail the whole batch.
    pub async fn set_displayed(&self, ids: Vec<String>, displayed: bool) -> Result<usize> {
        self.bulk_update(ids, move |cat| cat.is_displayed = displayed).await
    }

    /// Move several cats into a category (or clear it). Unknown ids fail the whole batch.
    pub async fn set_category(&self, ids: Vec<String>, category: Option<Category>) -> Result<usize> {
        self.bulk_update(ids, move |cat| cat.category = category).await
    }

    async fn bulk_update<F>(&self, ids: Vec<String>, change: F) -> Result<usize>
    where
        F: Fn(&mut Cat) + Send + 'static,
    {
        let updated = self
            .write(move |store| {
                let mut updated = Vec::with_capacity(ids.len());
                for id in &ids {
                    let mut cat = store
                        .get_cat(id)?
                        .ok_or_else(|| CatteryError::CatNotFound(id.clone()))?;
                    change(&mut cat);
                    cat.updated_at = chrono::Utc::now();
                    store.save_cat(&cat)?;
                    updated.push(cat.id);
                }
                Ok(updated)
            })
            .await?;

        for cat_id in &updated {
            self.feed.publish(ChangeEvent::CatUpdated { cat_id: cat_id.clone() });
        }
        Ok(updated.len())
    }

    /// Delete a cat with its edges and saved tree
    pub async fn delete_cat(&self, id: &str) -> Result<CascadeReport> {
        let id = id.to_string();
        let report = self.write(move |store| pedigree::delete_cat(store, &id)).await?;

        self.feed.publish(ChangeEvent::CatDeleted {
            cat_id: report.cat_id.clone(),
            edges_removed: report.edges_removed,
        });
        Ok(report)
    }

    // ---- parentage ----

    pub async fn parents(&self, id: &str) -> Result<Parents> {
        let id = id.to_string();
        self.read(move |store| pedigree::parents_of(store, &id)).await
    }

    pub async fn children(&self, id: &str) -> Result<Vec<ChildLink>> {
        let id = id.to_string();
        self.read(move |store| pedigree::children_of(store, &id)).await
    }

    /// Validate and record a parent link
    pub async fn link_parent(&self, proposed: ProposedEdge) -> Result<ParentageEdge> {
        let policy = self.pedigree.rule_policy();
        let edge = self
            .write(move |store| pedigree::link_parent(store, &proposed, &policy))
            .await?;

        self.feed.publish(ChangeEvent::EdgeCreated {
            edge_id: edge.edge_id.clone(),
            parent_id: edge.parent_id.clone(),
            child_id: edge.child_id.clone(),
            kind: edge.kind,
        });
        Ok(edge)
    }

    pub async fn unlink(&self, edge_id: &str) -> Result<ParentageEdge> {
        let edge_id = edge_id.to_string();
        let edge = self
            .write(move |store| {
                let edge = store
                    .get_edge(&edge_id)?
                    .ok_or_else(|| CatteryError::EdgeNotFound(edge_id.clone()))?;
                store.delete_edge(&edge_id)?;
                Ok(edge)
            })
            .await?;

        log::info!("Removed {} link {} -> {}", edge.kind, edge.parent_id, edge.child_id);
        self.feed.publish(ChangeEvent::EdgeDeleted {
            edge_id: edge.edge_id.clone(),
            parent_id: edge.parent_id.clone(),
            child_id: edge.child_id.clone(),
            kind: edge.kind,
        });
        Ok(edge)
    }

    // ---- pedigree trees ----

    /// Compute the current tree of `root_id`
    pub async fn pedigree(&self, root_id: &str, generations: Option<usize>) -> Result<PedigreeTreeView> {
        let options = self.tree_options(generations)?;
        let root_id = root_id.to_string();
        self.read(move |store| pedigree::materialize(store, &root_id, &options))
            .await
    }

    /// Materialize the current tree and store it as the saved tree for `root_id`
    pub async fn save_pedigree(&self, root_id: &str, request: SaveTreeRequest) -> Result<SavedPedigreeTree> {
        let mut options = self.tree_options(request.generations)?;
        options.name = request.name;
        options.description = request.description;
        let root_id = root_id.to_string();

        let saved = self
            .write(move |store| {
                let view = pedigree::materialize(store, &root_id, &options)?;
                let saved = SavedPedigreeTree::from_view(view);
                store.save_snapshot(&saved)?;
                Ok(saved)
            })
            .await?;

        log::info!("Saved pedigree tree for {} ({} cats)", saved.root_cat_id, saved.tree.nodes.len());
        self.feed.publish(ChangeEvent::SnapshotSaved {
            root_cat_id: saved.root_cat_id.clone(),
        });
        Ok(saved)
    }

    // ---- public reads ----
    //
    // A hidden cat reads as not found on every public route, including the
    // ones rooted at it. Ancestors are shown through their public view.

    /// Parents of a displayed cat
    pub async fn public_parents(&self, id: &str) -> Result<Parents> {
        let id = id.to_string();
        let parents = self
            .read(move |store| {
                displayed_cat(store, &id)?;
                pedigree::parents_of(store, &id)
            })
            .await?;
        Ok(parents.public_view())
    }

    /// Current tree of a displayed cat
    pub async fn public_pedigree(&self, root_id: &str, generations: Option<usize>) -> Result<PedigreeTreeView> {
        let options = self.tree_options(generations)?;
        let root_id = root_id.to_string();
        self.read(move |store| {
            displayed_cat(store, &root_id)?;
            pedigree::materialize(store, &root_id, &options)
        })
        .await
    }

    /// Saved tree of a displayed cat
    pub async fn public_saved_pedigree(&self, root_id: &str) -> Result<SavedPedigreeTree> {
        let root_id = root_id.to_string();
        self.read(move |store| {
            displayed_cat(store, &root_id)?;
            store
                .load_snapshot(&root_id)?
                .ok_or_else(|| CatteryError::NotFound(format!("saved pedigree for {}", root_id)))
        })
        .await
    }

    pub async fn saved_pedigree(&self, root_id: &str) -> Result<SavedPedigreeTree> {
        let root_id = root_id.to_string();
        self.read(move |store| {
            store
                .load_snapshot(&root_id)?
                .ok_or_else(|| CatteryError::NotFound(format!("saved pedigree for {}", root_id)))
        })
        .await
    }

    pub async fn delete_saved_pedigree(&self, root_id: &str) -> Result<()> {
        let root_id = root_id.to_string();
        let removed = root_id.clone();
        self.write(move |store| {
            if store.delete_snapshot(&root_id)? {
                Ok(())
            } else {
                Err(CatteryError::NotFound(format!("saved pedigree for {}", root_id)))
            }
        })
        .await?;

        self.feed.publish(ChangeEvent::SnapshotDeleted { root_cat_id: removed });
        Ok(())
    }

    // ---- maintenance ----

    pub async fn find_dangling(&self) -> Result<DanglingReport> {
        self.read(|store| pedigree::find_dangling(store)).await
    }

    pub async fn sweep(&self) -> Result<DanglingReport> {
        let removed = self.write(|store| pedigree::sweep(store)).await?;
        self.feed.publish(ChangeEvent::SweepCompleted {
            edges_removed: removed.edges.len(),
            snapshots_removed: removed.snapshots.len(),
        });
        Ok(removed)
    }

    // ---- site content ----

    pub async fn settings(&self) -> Result<BTreeMap<String, String>> {
        site::settings::get_settings(&self.db).await
    }

    pub async fn update_settings(&self, values: BTreeMap<String, String>) -> Result<usize> {
        let count = site::settings::upsert_settings(&self.db, values).await?;
        self.site_changed("settings");
        Ok(count)
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        if !site::settings::delete_setting(&self.db, key).await? {
            return Err(CatteryError::NotFound(format!("setting {}", key)));
        }
        self.site_changed("settings");
        Ok(())
    }

    pub async fn videos(&self, active_only: bool) -> Result<Vec<TikTokVideo>> {
        site::tiktok::list_videos(&self.db, active_only).await
    }

    pub async fn add_video(&self, input: NewVideo) -> Result<TikTokVideo> {
        let video = site::tiktok::add_video(&self.db, input).await?;
        self.site_changed("tiktok");
        Ok(video)
    }

    pub async fn update_video(&self, id: &str, patch: VideoPatch) -> Result<TikTokVideo> {
        let video = site::tiktok::update_video(&self.db, id, patch).await?;
        self.site_changed("tiktok");
        Ok(video)
    }

    pub async fn reorder_videos(&self, ordered_ids: Vec<String>) -> Result<()> {
        site::tiktok::reorder_videos(&self.db, ordered_ids).await?;
        self.site_changed("tiktok");
        Ok(())
    }

    pub async fn delete_video(&self, id: &str) -> Result<()> {
        if !site::tiktok::delete_video(&self.db, id).await? {
            return Err(CatteryError::NotFound(format!("video {}", id)));
        }
        self.site_changed("tiktok");
        Ok(())
    }

    pub async fn create_reservation(&self, input: NewReservation) -> Result<Reservation> {
        let reservation = site::reservations::create_reservation(&self.db, input).await?;
        self.site_changed("reservations");
        Ok(reservation)
    }

    pub async fn reservations(&self, status: Option<ReservationStatus>) -> Result<Vec<Reservation>> {
        site::reservations::list_reservations(&self.db, status).await
    }

    pub async fn set_reservation_status(&self, id: &str, status: ReservationStatus) -> Result<Reservation> {
        let reservation = site::reservations::set_status(&self.db, id, status).await?;
        self.site_changed("reservations");
        Ok(reservation)
    }

    pub async fn delete_reservation(&self, id: &str) -> Result<()> {
        if !site::reservations::delete_reservation(&self.db, id).await? {
            return Err(CatteryError::NotFound(format!("reservation {}", id)));
        }
        self.site_changed("reservations");
        Ok(())
    }

    fn site_changed(&self, section: &str) {
        self.feed.publish(ChangeEvent::SiteContentChanged {
            section: section.to_string(),
        });
    }
}

fn displayed_cat(store: &SqliteStore<'_>, id: &str) -> Result<Cat> {
    match store.get_cat(id)? {
        Some(cat) if cat.is_displayed => Ok(cat),
        _ => Err(CatteryError::CatNotFound(id.to_string())),
    }
}
