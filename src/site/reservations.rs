//! Reservation requests submitted from the public site.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{CatteryError, Result};
use crate::store::{parse_timestamp, CatStore, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CatteryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(CatteryError::InvalidInput(format!("unknown reservation status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: String,
    pub cat_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReservation {
    #[serde(default)]
    pub cat_id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl NewReservation {
    /// Shape checks that don't need the database
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatteryError::InvalidInput("name must not be empty".to_string()));
        }
        let email_regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex pattern");
        if !email_regex.is_match(self.email.trim()) {
            return Err(CatteryError::InvalidInput(format!("invalid email address: {}", self.email)));
        }
        Ok(())
    }
}

struct ReservationRow {
    id: String,
    cat_id: Option<String>,
    name: String,
    email: String,
    phone: Option<String>,
    message: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ReservationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cat_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            message: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_reservation(self) -> Result<Reservation> {
        Ok(Reservation {
            status: self.status.parse::<ReservationStatus>()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            cat_id: self.cat_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            message: self.message,
        })
    }
}

const RESERVATION_COLUMNS: &str =
    "reservation_id, cat_id, name, email, phone, message, status, created_at, updated_at";

fn load_reservation(conn: &Connection, id: &str) -> Result<Option<Reservation>> {
    conn.query_row(
        &format!("SELECT {} FROM reservations WHERE reservation_id = ?1", RESERVATION_COLUMNS),
        params![id],
        ReservationRow::from_row,
    )
    .optional()?
    .map(ReservationRow::into_reservation)
    .transpose()
}

pub async fn create_reservation(db: &Db, input: NewReservation) -> Result<Reservation> {
    input.validate()?;

    db.with_connection(move |conn| {
        let cat_id = input.cat_id.filter(|id| !id.trim().is_empty());
        if let Some(cat_id) = &cat_id {
            if !SqliteStore::new(conn).cat_exists(cat_id)? {
                return Err(CatteryError::CatNotFound(cat_id.clone()));
            }
        }

        let now = Utc::now();
        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            cat_id,
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone.filter(|p| !p.trim().is_empty()),
            message: input.message,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            &format!(
                "INSERT INTO reservations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                RESERVATION_COLUMNS
            ),
            params![
                reservation.id,
                reservation.cat_id,
                reservation.name,
                reservation.email,
                reservation.phone,
                reservation.message,
                reservation.status.as_str(),
                stamp,
                stamp
            ],
        )?;
        log::info!("New reservation request {} (cat: {:?})", reservation.id, reservation.cat_id);
        Ok(reservation)
    })
    .await
}

/// Newest first, optionally filtered by status
pub async fn list_reservations(db: &Db, status: Option<ReservationStatus>) -> Result<Vec<Reservation>> {
    db.with_connection(move |conn| {
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM reservations WHERE status = ?1 ORDER BY created_at DESC, rowid DESC",
                    RESERVATION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], ReservationRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM reservations ORDER BY created_at DESC, rowid DESC",
                    RESERVATION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], ReservationRow::from_row)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                rows
            }
        };
        rows.into_iter().map(ReservationRow::into_reservation).collect()
    })
    .await
}

pub async fn set_status(db: &Db, id: &str, status: ReservationStatus) -> Result<Reservation> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE reservations SET status = ?2, updated_at = ?3 WHERE reservation_id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)],
        )?;
        if updated == 0 {
            return Err(CatteryError::NotFound(format!("reservation {}", id)));
        }
        load_reservation(conn, &id)?.ok_or_else(|| CatteryError::NotFound(format!("reservation {}", id)))
    })
    .await
}

pub async fn delete_reservation(db: &Db, id: &str) -> Result<bool> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let removed = conn.execute("DELETE FROM reservations WHERE reservation_id = ?1", params![id])?;
        Ok(removed > 0)
    })
    .await
}
