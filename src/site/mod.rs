//! Site content outside the pedigree graph: key/value settings, the TikTok
//! showcase and reservation requests.

pub mod reservations;
pub mod settings;
pub mod tiktok;

pub use reservations::{NewReservation, Reservation, ReservationStatus};
pub use tiktok::{NewVideo, TikTokVideo, VideoPatch};

#[cfg(test)]
pub(crate) mod testing {
    use crate::db::Db;
    use std::path::Path;
    use tempfile::TempDir;

    /// Migrated throwaway database
    pub async fn migrated_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
            .await
            .unwrap();
        (db, temp_dir)
    }
}
