use anyhow::{Result, bail};
use chrono::Utc;
use log::error;
use uuid::Uuid;

use crate::leaderboard::{self, LeaderboardEntry};
use crate::level::{Level, level_for};
use crate::models::{
    Brew, CollectionKind, Collections, Drink, Entity, NewBrew, NewDrink, NewShop, Shop, Stats,
    validate_new_brew, validate_new_drink, validate_new_shop,
};
use crate::session::Identity;
use crate::store::{DocumentStore, LocalStorage};
use crate::sync::{SyncEvent, SyncPolicy};

pub use crate::sync::PointsSink;

/// Grant the creation reward for one new element of `kind`.
pub async fn reward(sink: &impl PointsSink, kind: CollectionKind) {
    sink.grant(kind.creation_points()).await;
}

/// The app's working set of brews, drinks and shops, kept in step with
/// whichever store is authoritative.
pub struct CoffeeService<L, R> {
    policy: SyncPolicy<L, R>,
    collections: Collections,
}

impl<L: LocalStorage, R: DocumentStore> CoffeeService<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            policy: SyncPolicy::new(local, remote),
            collections: Collections::default(),
        }
    }

    pub fn policy(&self) -> &SyncPolicy<L, R> {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut SyncPolicy<L, R> {
        &mut self.policy
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn brews(&self) -> &[Brew] {
        &self.collections.brews
    }

    pub fn drinks(&self) -> &[Drink] {
        &self.collections.drinks
    }

    pub fn shops(&self) -> &[Shop] {
        &self.collections.shops
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.policy.identity()
    }

    /// Auth observer entry point. Replaces the working set with whatever the
    /// resulting transition loaded.
    pub async fn handle_auth_change(
        &mut self,
        reported: Option<Identity>,
    ) -> Result<Option<SyncEvent>> {
        let event = self.policy.observe(reported).await?;
        if let Some(event) = &event {
            self.collections = event.collections().clone();
        }
        Ok(event)
    }

    // --- Brews ---

    /// New brews go to the front of the list.
    pub async fn create_brew(&mut self, new: NewBrew) -> Result<Brew> {
        validate_new_brew(&new)?;
        let brew = Brew::from_new(new, new_id(), Utc::now().to_rfc3339());
        self.collections.brews.insert(0, brew.clone());
        reward(&self.policy, Brew::KIND).await;
        self.policy.write(&self.collections.brews).await;
        Ok(brew)
    }

    pub async fn update_brew(&mut self, id: &str, new: NewBrew) -> Result<Brew> {
        validate_new_brew(&new)?;
        let brew = find_mut(&mut self.collections.brews, id)?;
        brew.apply(new);
        let updated = brew.clone();
        self.policy.write(&self.collections.brews).await;
        Ok(updated)
    }

    pub async fn delete_brew(&mut self, id: &str) -> bool {
        self.remove::<Brew>(id).await
    }

    /// Flip a brew's favorite flag and return the new value.
    pub async fn toggle_favorite(&mut self, id: &str) -> Result<bool> {
        let brew = find_mut(&mut self.collections.brews, id)?;
        brew.favorite = !brew.favorite;
        let favorite = brew.favorite;
        self.policy.write(&self.collections.brews).await;
        Ok(favorite)
    }

    pub fn favorites(&self) -> Vec<&Brew> {
        self.collections.brews.iter().filter(|b| b.favorite).collect()
    }

    // --- Drinks ---

    pub async fn create_drink(&mut self, new: NewDrink) -> Result<Drink> {
        validate_new_drink(&new)?;
        let drink = Drink::from_new(new, new_id());
        self.collections.drinks.push(drink.clone());
        reward(&self.policy, Drink::KIND).await;
        self.policy.write(&self.collections.drinks).await;
        Ok(drink)
    }

    pub async fn update_drink(&mut self, id: &str, new: NewDrink) -> Result<Drink> {
        validate_new_drink(&new)?;
        let drink = find_mut(&mut self.collections.drinks, id)?;
        *drink = Drink::from_new(new, drink.id.clone());
        let updated = drink.clone();
        self.policy.write(&self.collections.drinks).await;
        Ok(updated)
    }

    pub async fn delete_drink(&mut self, id: &str) -> bool {
        self.remove::<Drink>(id).await
    }

    // --- Shops ---

    pub async fn create_shop(&mut self, new: NewShop) -> Result<Shop> {
        validate_new_shop(&new)?;
        let shop = Shop::from_new(new, new_id());
        self.collections.shops.push(shop.clone());
        reward(&self.policy, Shop::KIND).await;
        self.policy.write(&self.collections.shops).await;
        Ok(shop)
    }

    pub async fn update_shop(&mut self, id: &str, new: NewShop) -> Result<Shop> {
        validate_new_shop(&new)?;
        let shop = find_mut(&mut self.collections.shops, id)?;
        *shop = Shop::from_new(new, shop.id.clone());
        let updated = shop.clone();
        self.policy.write(&self.collections.shops).await;
        Ok(updated)
    }

    pub async fn delete_shop(&mut self, id: &str) -> bool {
        self.remove::<Shop>(id).await
    }

    // --- Progress ---

    pub fn stats(&self) -> Stats {
        self.collections.stats()
    }

    pub fn points(&self) -> u64 {
        self.policy.cached_points()
    }

    pub fn level(&self) -> Level {
        level_for(self.points())
    }

    /// Top profiles by points. An unreachable store yields an empty board.
    pub async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let me = self.identity().map(|i| i.uid.as_str());
        leaderboard::fetch(self.policy.remote(), me, limit)
            .await
            .unwrap_or_else(|e| {
                error!("Loading leaderboard failed: {e:#}");
                Vec::new()
            })
    }

    async fn remove<T: Entity>(&mut self, id: &str) -> bool {
        let items = T::items_mut(&mut self.collections);
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return false;
        }
        self.policy.write(T::items(&self.collections)).await;
        true
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn find_mut<'a, T: Entity>(items: &'a mut [T], id: &str) -> Result<&'a mut T> {
    match items.iter_mut().find(|item| item.id() == id) {
        Some(item) => Ok(item),
        None => bail!("No {} entry with id '{id}'", T::KIND.field()),
    }
}
