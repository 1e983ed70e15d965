use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{ProfileUpdate, UserProfile};
use crate::store::{DocumentStore, LocalStorage};

/// SQLite-backed storage.
///
/// One file can play two roles: the device's local key-value storage
/// (`local_storage` table) and a user-document store (`users` table). The CLI
/// keeps them in separate files so the "cloud" can be served to other devices.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS local_storage (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                    uid TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Points get their own column so the leaderboard can sort without
            // parsing every document.
            self.conn.execute_batch(
                "ALTER TABLE users ADD COLUMN points INTEGER NOT NULL DEFAULT 0;
                 UPDATE users SET points = COALESCE(json_extract(doc, '$.points'), 0);
                 CREATE INDEX IF NOT EXISTS idx_users_points ON users(points DESC);
                 PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Local key-value storage ---

    pub fn get_local(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_local(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO local_storage (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn remove_local(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    // --- User documents ---

    pub fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        let Some(doc) = self.get_document(uid)? else {
            return Ok(None);
        };
        let profile = serde_json::from_value(doc)
            .with_context(|| format!("Malformed user document for '{uid}'"))?;
        Ok(Some(profile))
    }

    pub fn put_profile(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        let doc = serde_json::to_value(profile)?;
        self.put_document(uid, &doc)
    }

    /// Merge top-level fields into an existing document.
    ///
    /// Works on the raw JSON so fields this crate does not model survive.
    /// Returns `false` when there is no document for `uid`.
    pub fn merge_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<bool> {
        let Some(mut doc) = self.get_document(uid)? else {
            return Ok(false);
        };
        let serde_json::Value::Object(fields) = serde_json::to_value(update)? else {
            bail!("Profile update did not serialize to an object");
        };
        let Some(target) = doc.as_object_mut() else {
            bail!("User document for '{uid}' is not an object");
        };
        target.extend(fields);
        self.put_document(uid, &doc)?;
        Ok(true)
    }

    pub fn top_profiles(&self, limit: usize) -> Result<Vec<(String, UserProfile)>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT uid, doc FROM users ORDER BY points DESC, uid ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (uid, doc) = row?;
            let profile: UserProfile = serde_json::from_str(&doc)
                .with_context(|| format!("Malformed user document for '{uid}'"))?;
            results.push((uid, profile));
        }
        Ok(results)
    }

    fn get_document(&self, uid: &str) -> Result<Option<serde_json::Value>> {
        let doc: Option<String> = self
            .conn
            .query_row("SELECT doc FROM users WHERE uid = ?1", params![uid], |row| {
                row.get(0)
            })
            .optional()?;
        doc.map(|d| {
            serde_json::from_str(&d).with_context(|| format!("Corrupt user document for '{uid}'"))
        })
        .transpose()
    }

    fn put_document(&self, uid: &str, doc: &serde_json::Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let points = doc
            .get("points")
            .and_then(serde_json::Value::as_u64)
            .map_or(0, |p| i64::try_from(p).unwrap_or(i64::MAX));
        self.conn.execute(
            "INSERT INTO users (uid, doc, points, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(uid) DO UPDATE SET
                doc = excluded.doc, points = excluded.points, updated_at = excluded.updated_at",
            params![uid, doc.to_string(), points, now],
        )?;
        Ok(())
    }
}

impl LocalStorage for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.get_local(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.set_local(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_local(key)?;
        Ok(())
    }
}

impl DocumentStore for Database {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.get_profile(uid)
    }

    async fn set(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        self.put_profile(uid, profile)
    }

    async fn update(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        if !self.merge_profile(uid, update)? {
            bail!("No user document for '{uid}'");
        }
        Ok(())
    }

    async fn top_by_points(&self, limit: usize) -> Result<Vec<(String, UserProfile)>> {
        self.top_profiles(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Drink, NewDrink};

    fn profile(name: &str, points: u64) -> UserProfile {
        UserProfile {
            email: Some(format!("{}@example.com", name.to_lowercase())),
            display_name: Some(name.to_string()),
            points,
            ..UserProfile::default()
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_local_set_get_remove() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_local("coffee_brews").unwrap().is_none());

        db.set_local("coffee_brews", "[]").unwrap();
        assert_eq!(db.get_local("coffee_brews").unwrap().as_deref(), Some("[]"));

        db.set_local("coffee_brews", "[1]").unwrap();
        assert_eq!(db.get_local("coffee_brews").unwrap().as_deref(), Some("[1]"));

        assert!(db.remove_local("coffee_brews").unwrap());
        assert!(!db.remove_local("coffee_brews").unwrap());
        assert!(db.get_local("coffee_brews").unwrap().is_none());
    }

    #[test]
    fn test_put_and_get_profile() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_profile("u1").unwrap().is_none());

        let p = profile("Anna", 12);
        db.put_profile("u1", &p).unwrap();
        assert_eq!(db.get_profile("u1").unwrap().unwrap(), p);
    }

    #[test]
    fn test_merge_profile_updates_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        db.put_profile("u1", &profile("Anna", 12)).unwrap();

        let drinks = vec![Drink::from_new(
            NewDrink {
                drink_name: "Cortado".to_string(),
                recipe: "1:1 milk".to_string(),
            },
            "d1".to_string(),
        )];
        let update = ProfileUpdate {
            drinks: Some(drinks.clone()),
            ..ProfileUpdate::default()
        };
        assert!(db.merge_profile("u1", &update).unwrap());

        let stored = db.get_profile("u1").unwrap().unwrap();
        assert_eq!(stored.drinks, drinks);
        assert_eq!(stored.points, 12);
        assert_eq!(stored.display_name.as_deref(), Some("Anna"));
    }

    #[test]
    fn test_merge_profile_keeps_unknown_fields() {
        let db = Database::open_in_memory().unwrap();
        let doc = serde_json::json!({
            "email": "anna@example.com",
            "photoURL": "https://example.com/a.png",
            "points": 1
        });
        db.put_document("u1", &doc).unwrap();

        db.merge_profile("u1", &ProfileUpdate::points(6)).unwrap();

        let raw = db.get_document("u1").unwrap().unwrap();
        assert_eq!(raw["photoURL"], "https://example.com/a.png");
        assert_eq!(raw["points"], 6);
    }

    #[test]
    fn test_merge_profile_missing_document() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.merge_profile("ghost", &ProfileUpdate::points(5)).unwrap());
        assert!(db.get_profile("ghost").unwrap().is_none());
    }

    #[test]
    fn test_top_profiles_sorted_by_points() {
        let db = Database::open_in_memory().unwrap();
        db.put_profile("u1", &profile("Anna", 40)).unwrap();
        db.put_profile("u2", &profile("Ben", 300)).unwrap();
        db.put_profile("u3", &profile("Cleo", 5)).unwrap();
        db.merge_profile("u3", &ProfileUpdate::points(500)).unwrap();

        let top = db.top_profiles(2).unwrap();
        let uids: Vec<&str> = top.iter().map(|(uid, _)| uid.as_str()).collect();
        assert_eq!(uids, vec!["u3", "u2"]);
        assert_eq!(top[0].1.points, 500);
    }

    #[test]
    fn test_huge_points_rank_first() {
        let db = Database::open_in_memory().unwrap();
        db.put_profile("u1", &profile("Anna", 40)).unwrap();
        db.put_profile("u2", &profile("Ben", u64::MAX)).unwrap();

        let top = db.top_profiles(10).unwrap();
        assert_eq!(top[0].0, "u2");
        assert_eq!(top[0].1.points, u64::MAX);
    }

    #[tokio::test]
    async fn test_document_store_update_requires_document() {
        let db = Database::open_in_memory().unwrap();
        let err = DocumentStore::update(&db, "ghost", &ProfileUpdate::points(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));

        DocumentStore::set(&db, "u1", &profile("Anna", 0)).await.unwrap();
        DocumentStore::update(&db, "u1", &ProfileUpdate::points(7))
            .await
            .unwrap();
        let stored = DocumentStore::get(&db, "u1").await.unwrap().unwrap();
        assert_eq!(stored.points, 7);
    }
}
