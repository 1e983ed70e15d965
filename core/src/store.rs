//! Storage seams: device-local key-value storage and the remote user-document store.
//!
//! The CLI provides SQLite and HTTP implementations; tests use an in-memory
//! SQLite database for both.

use anyhow::{Context, Result};
use log::warn;

use crate::models::{CollectionKind, Collections, Entity, ProfileUpdate, UserProfile};

/// Browser-style key-value storage on the current device.
pub trait LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Per-user documents in the `users` collection of the cloud store.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Full overwrite. Only used when an account document is first created.
    async fn set(&self, uid: &str, profile: &UserProfile) -> Result<()>;

    /// Merge the given top-level fields. Fails if the document does not exist.
    async fn update(&self, uid: &str, update: &ProfileUpdate) -> Result<()>;

    /// Documents ordered by points, highest first.
    async fn top_by_points(&self, limit: usize) -> Result<Vec<(String, UserProfile)>>;
}

/// Read one collection from local storage.
///
/// A missing key reads as empty. So does content that fails to parse; that
/// case is logged and the stored value is left untouched.
pub fn read_local<T: Entity>(storage: &impl LocalStorage) -> Result<Vec<T>> {
    let key = T::KIND.storage_key();
    let Some(raw) = storage.get_item(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            warn!("Ignoring unreadable local data under '{key}': {e}");
            Ok(Vec::new())
        }
    }
}

/// Replace one collection in local storage.
pub fn write_local<T: Entity>(storage: &impl LocalStorage, items: &[T]) -> Result<()> {
    let key = T::KIND.storage_key();
    let json = serde_json::to_string(items)
        .with_context(|| format!("Failed to serialize {}", T::KIND.field()))?;
    storage.set_item(key, &json)
}

/// Read all three local collections.
pub fn read_local_collections(storage: &impl LocalStorage) -> Result<Collections> {
    Ok(Collections {
        brews: read_local(storage)?,
        drinks: read_local(storage)?,
        shops: read_local(storage)?,
    })
}

/// Remove all three local collection keys. Removing an absent key is a no-op.
pub fn clear_local_collections(storage: &impl LocalStorage) -> Result<()> {
    for kind in CollectionKind::ALL {
        storage.remove_item(kind.storage_key())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Drink, Shop};

    fn drink(id: &str, name: &str) -> Drink {
        Drink {
            id: id.to_string(),
            drink_name: name.to_string(),
            recipe: "double shot, 120ml milk".to_string(),
        }
    }

    #[test]
    fn test_read_local_missing_key_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let drinks: Vec<Drink> = read_local(&db).unwrap();
        assert!(drinks.is_empty());
    }

    #[test]
    fn test_write_then_read_local_preserves_order() {
        let db = Database::open_in_memory().unwrap();
        let drinks = vec![drink("d2", "Cortado"), drink("d1", "Flat White")];
        write_local(&db, &drinks).unwrap();

        let back: Vec<Drink> = read_local(&db).unwrap();
        assert_eq!(back, drinks);
        assert!(db.get_item("coffee_drinks").unwrap().is_some());
    }

    #[test]
    fn test_read_local_unparsable_is_empty() {
        let db = Database::open_in_memory().unwrap();
        db.set_item("coffee_shops", "{not json").unwrap();

        let shops: Vec<Shop> = read_local(&db).unwrap();
        assert!(shops.is_empty());
        // The broken value is not overwritten by a read
        assert_eq!(
            db.get_item("coffee_shops").unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn test_clear_local_collections_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        write_local(&db, &[drink("d1", "Cortado")]).unwrap();

        clear_local_collections(&db).unwrap();
        clear_local_collections(&db).unwrap();

        assert!(db.get_item("coffee_drinks").unwrap().is_none());
        assert!(read_local_collections(&db).unwrap().is_empty());
    }
}
