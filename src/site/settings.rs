use std::collections::BTreeMap;

use chrono::Utc;
use regex::Regex;
use rusqlite::params;

use crate::db::Db;
use crate::error::{CatteryError, Result};

/// Keys are lowercase snake case, at most 64 characters
pub fn validate_key(key: &str) -> Result<()> {
    let key_regex = Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("Invalid regex pattern");
    if key_regex.is_match(key) {
        Ok(())
    } else {
        Err(CatteryError::InvalidInput(format!("invalid setting key: {:?}", key)))
    }
}

pub async fn get_settings(db: &Db) -> Result<BTreeMap<String, String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT key, value FROM site_settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut settings = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            settings.insert(key, value);
        }
        Ok(settings)
    })
    .await
}

/// Insert or overwrite every key in `values`. Nothing is written if any key is invalid.
pub async fn upsert_settings(db: &Db, values: BTreeMap<String, String>) -> Result<usize> {
    for key in values.keys() {
        validate_key(key)?;
    }

    let updated_at = Utc::now().to_rfc3339();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO site_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )?;
            for (key, value) in &values {
                stmt.execute(params![key, value, updated_at])?;
            }
        }
        tx.commit()?;
        log::info!("Updated {} site settings", values.len());
        Ok(values.len())
    })
    .await
}

pub async fn delete_setting(db: &Db, key: &str) -> Result<bool> {
    let key = key.to_string();
    db.with_connection(move |conn| {
        let removed = conn.execute("DELETE FROM site_settings WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::testing::migrated_db;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("hero_title").is_ok());
        assert!(validate_key("contact_phone2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("Hero").is_err());
        assert!(validate_key("2fast").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key(&"a".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let (db, _temp) = migrated_db().await;

        let mut values = BTreeMap::new();
        values.insert("hero_title".to_string(), "Siberian kittens".to_string());
        values.insert("contact_email".to_string(), "hi@example.com".to_string());
        assert_eq!(upsert_settings(&db, values).await.unwrap(), 2);

        let mut update = BTreeMap::new();
        update.insert("hero_title".to_string(), "New litter".to_string());
        upsert_settings(&db, update).await.unwrap();

        let settings = get_settings(&db).await.unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings["hero_title"], "New litter");

        assert!(delete_setting(&db, "hero_title").await.unwrap());
        assert!(!delete_setting(&db, "hero_title").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_key_writes_nothing() {
        let (db, _temp) = migrated_db().await;
        let mut values = BTreeMap::new();
        values.insert("good_key".to_string(), "x".to_string());
        values.insert("Bad Key".to_string(), "y".to_string());

        assert!(matches!(upsert_settings(&db, values).await, Err(CatteryError::InvalidInput(_))));
        assert!(get_settings(&db).await.unwrap().is_empty());
    }
}
