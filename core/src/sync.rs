//! Routing between device-local storage and the signed-in user's cloud document.
//!
//! Exactly one store is authoritative at a time: the cloud document while a user
//! is signed in, local storage otherwise. Store failures never escape this
//! module; they are logged and the caller carries on with empty or unchanged
//! data.

use std::cell::Cell;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info};

use crate::models::{Collections, Entity, ProfileUpdate, Stats, UserProfile};
use crate::session::{Identity, Session, Transition};
use crate::store::{
    DocumentStore, LocalStorage, clear_local_collections, read_local_collections, write_local,
};

/// Notification for the presentation layer after an auth transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Signed in: the cloud collections, after any migration.
    DataLoaded(Collections),
    /// Signed out: the collections currently in local storage.
    DataCleared(Collections),
}

impl SyncEvent {
    #[must_use]
    pub fn collections(&self) -> &Collections {
        match self {
            Self::DataLoaded(c) | Self::DataCleared(c) => c,
        }
    }

    #[must_use]
    pub fn into_collections(self) -> Collections {
        match self {
            Self::DataLoaded(c) | Self::DataCleared(c) => c,
        }
    }
}

/// What the sign-in migration check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The cloud document already holds data; local storage was left alone.
    RemoteHasData,
    /// Both sides were empty.
    NothingToMigrate,
    /// Guest data was moved into the cloud document and cleared locally.
    Migrated(Stats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Remote,
}

/// Capability to award points for a completed action.
#[allow(async_fn_in_trait)]
pub trait PointsSink {
    async fn grant(&self, amount: u32);
}

type Listener = Box<dyn Fn(&SyncEvent)>;

pub struct SyncPolicy<L, R> {
    local: L,
    remote: R,
    session: Session,
    cached_points: Cell<u64>,
    last_migration: Option<MigrationOutcome>,
    listeners: Vec<Listener>,
}

impl<L: LocalStorage, R: DocumentStore> SyncPolicy<L, R> {
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            session: Session::new(),
            cached_points: Cell::new(0),
            last_migration: None,
            listeners: Vec::new(),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    pub fn authoritative_store(&self) -> StoreKind {
        if self.session.is_signed_in() {
            StoreKind::Remote
        } else {
            StoreKind::Local
        }
    }

    /// Points as last seen on the cloud document. Always 0 for guests.
    pub fn cached_points(&self) -> u64 {
        self.cached_points.get()
    }

    /// Result of the migration check from the most recent sign-in.
    pub fn last_migration(&self) -> Option<MigrationOutcome> {
        self.last_migration
    }

    pub fn subscribe(&mut self, listener: impl Fn(&SyncEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Auth observer hook: dispatch a reported auth state to the matching entry point.
    pub async fn observe(&mut self, reported: Option<Identity>) -> Result<Option<SyncEvent>> {
        match reported {
            Some(identity) => self.on_identity_established(identity).await,
            None => Ok(self.on_identity_cleared()),
        }
    }

    /// Sign-in transition: ensure the cloud document, migrate guest data if the
    /// document is empty, then load the cloud collections.
    ///
    /// Returns `Ok(None)` if this user was already signed in. Errors only when a
    /// different user is still signed in.
    pub async fn on_identity_established(
        &mut self,
        identity: Identity,
    ) -> Result<Option<SyncEvent>> {
        let Some(Transition::Established(identity)) = self.session.observe(Some(identity))? else {
            return Ok(None);
        };
        info!("Signed in as '{}'", identity.uid);

        self.last_migration = None;
        match self.ensure_profile(&identity).await {
            Ok(profile) => {
                self.cached_points.set(profile.points);
                match self.migrate_local_data(&identity.uid, &profile).await {
                    Ok(outcome) => self.last_migration = Some(outcome),
                    Err(e) => error!("Migrating guest data for '{}' failed: {e:#}", identity.uid),
                }
            }
            Err(e) => error!("Loading profile for '{}' failed: {e:#}", identity.uid),
        }

        let collections = match self.remote.get(&identity.uid).await {
            Ok(Some(profile)) => profile.into_collections(),
            Ok(None) => Collections::default(),
            Err(e) => {
                error!("Fetching collections for '{}' failed: {e:#}", identity.uid);
                Collections::default()
            }
        };

        Ok(Some(self.emit(SyncEvent::DataLoaded(collections))))
    }

    /// Sign-out transition: reload the untouched guest collections from local storage.
    ///
    /// Returns `None` if no user was signed in.
    pub fn on_identity_cleared(&mut self) -> Option<SyncEvent> {
        match self.session.observe(None) {
            Ok(Some(Transition::Cleared)) => {}
            Ok(_) => return None,
            Err(e) => {
                error!("Unexpected sign-out state: {e:#}");
                return None;
            }
        }
        info!("Signed out; using local storage");

        self.cached_points.set(0);
        self.last_migration = None;
        let collections = read_local_collections(&self.local).unwrap_or_else(|e| {
            error!("Reading local collections failed: {e:#}");
            Collections::default()
        });
        Some(self.emit(SyncEvent::DataCleared(collections)))
    }

    /// Persist a whole collection to the authoritative store.
    pub async fn write<T: Entity>(&self, items: &[T]) {
        if let Err(e) = self.try_write(items).await {
            error!("Saving {} failed: {e:#}", T::KIND.field());
        }
    }

    pub async fn try_write<T: Entity>(&self, items: &[T]) -> Result<()> {
        match self.identity() {
            Some(identity) => {
                debug!("Saving {} {} to cloud", items.len(), T::KIND.field());
                let update = T::into_update(items.to_vec());
                self.remote.update(&identity.uid, &update).await
            }
            None => {
                debug!("Saving {} {} locally", items.len(), T::KIND.field());
                write_local(&self.local, items)
            }
        }
    }

    /// Add `amount` to the signed-in user's points and return the new total.
    ///
    /// Guests never earn points. The read and the write are separate calls, so
    /// concurrent grants for one user can lose an update.
    pub async fn grant_points(&self, amount: u32) -> Option<u64> {
        let identity = self.identity()?;
        match self.add_points(&identity.uid, amount).await {
            Ok(total) => {
                self.cached_points.set(total);
                info!("Granted {amount} points to '{}', total {total}", identity.uid);
                Some(total)
            }
            Err(e) => {
                error!("Granting points to '{}' failed: {e:#}", identity.uid);
                None
            }
        }
    }

    async fn add_points(&self, uid: &str, amount: u32) -> Result<u64> {
        let current = self.remote.get(uid).await?.map_or(0, |p| p.points);
        let total = current.saturating_add(u64::from(amount));
        self.remote.update(uid, &ProfileUpdate::points(total)).await?;
        Ok(total)
    }

    async fn ensure_profile(&self, identity: &Identity) -> Result<UserProfile> {
        if let Some(profile) = self.remote.get(&identity.uid).await? {
            return Ok(profile);
        }
        let profile = UserProfile {
            email: identity.email.clone(),
            display_name: identity.profile_name(),
            created_at: Some(Utc::now().to_rfc3339()),
            ..UserProfile::default()
        };
        self.remote.set(&identity.uid, &profile).await?;
        info!("Created cloud profile for '{}'", identity.uid);
        Ok(profile)
    }

    /// Move guest data into an empty cloud document, then clear it locally.
    async fn migrate_local_data(
        &self,
        uid: &str,
        profile: &UserProfile,
    ) -> Result<MigrationOutcome> {
        if profile.has_collections() {
            return Ok(MigrationOutcome::RemoteHasData);
        }
        let local = read_local_collections(&self.local)?;
        if local.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let stats = local.stats();
        let update = ProfileUpdate {
            points: Some(0),
            brews: Some(local.brews),
            drinks: Some(local.drinks),
            shops: Some(local.shops),
        };
        self.remote.update(uid, &update).await?;
        self.cached_points.set(0);
        clear_local_collections(&self.local)?;

        info!(
            "Migrated guest data to '{uid}': {} brews, {} drinks, {} shops",
            stats.brews, stats.drinks, stats.shops
        );
        Ok(MigrationOutcome::Migrated(stats))
    }

    fn emit(&self, event: SyncEvent) -> SyncEvent {
        for listener in &self.listeners {
            listener(&event);
        }
        event
    }
}

impl<L: LocalStorage, R: DocumentStore> PointsSink for SyncPolicy<L, R> {
    async fn grant(&self, amount: u32) {
        self.grant_points(amount).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::bail;

    use super::*;
    use crate::db::Database;
    use crate::models::{Brew, Drink, NewBrew, NewShop, Shop};
    use crate::store::read_local;

    /// Cloud store wrapper that can be told to fail.
    struct FlakyRemote {
        inner: Database,
        fail_gets: Cell<bool>,
        fail_updates: Cell<bool>,
    }

    impl FlakyRemote {
        fn new() -> Self {
            Self {
                inner: Database::open_in_memory().unwrap(),
                fail_gets: Cell::new(false),
                fail_updates: Cell::new(false),
            }
        }
    }

    impl DocumentStore for FlakyRemote {
        async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
            if self.fail_gets.get() {
                bail!("network unreachable");
            }
            self.inner.get(uid).await
        }

        async fn set(&self, uid: &str, profile: &UserProfile) -> Result<()> {
            self.inner.set(uid, profile).await
        }

        async fn update(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
            if self.fail_updates.get() {
                bail!("network unreachable");
            }
            self.inner.update(uid, update).await
        }

        async fn top_by_points(&self, limit: usize) -> Result<Vec<(String, UserProfile)>> {
            self.inner.top_by_points(limit).await
        }
    }

    fn policy() -> SyncPolicy<Database, FlakyRemote> {
        SyncPolicy::new(Database::open_in_memory().unwrap(), FlakyRemote::new())
    }

    fn anna() -> Identity {
        Identity {
            uid: "u-anna".to_string(),
            email: Some("anna@example.com".to_string()),
            display_name: None,
        }
    }

    fn brew(id: &str) -> Brew {
        Brew::from_new(
            NewBrew {
                bean_name: "Kenya AA".to_string(),
                dose_in: "18".to_string(),
                ratio: "2".to_string(),
                ..NewBrew::default()
            },
            id.to_string(),
            "2024-06-15T08:00:00+00:00".to_string(),
        )
    }

    fn shop(id: &str) -> Shop {
        Shop::from_new(
            NewShop {
                shop_name: "Bonanza".to_string(),
                location: "52.53,13.42".to_string(),
                ..NewShop::default()
            },
            id.to_string(),
        )
    }

    #[tokio::test]
    async fn test_guest_write_goes_to_local_storage() {
        let p = policy();
        assert_eq!(p.authoritative_store(), StoreKind::Local);

        let brews = vec![brew("b1"), brew("b2")];
        p.write(&brews).await;
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), brews);

        p.write(&brews[..1]).await;
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), vec![brew("b1")]);
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_profile() {
        let mut p = policy();
        let event = p.on_identity_established(anna()).await.unwrap().unwrap();

        assert_eq!(event, SyncEvent::DataLoaded(Collections::default()));
        let profile = p.remote().inner.get_profile("u-anna").unwrap().unwrap();
        assert_eq!(profile.email.as_deref(), Some("anna@example.com"));
        assert_eq!(profile.display_name.as_deref(), Some("anna"));
        assert_eq!(profile.points, 0);
        assert!(profile.created_at.is_some());
        assert_eq!(p.last_migration(), Some(MigrationOutcome::NothingToMigrate));
    }

    #[tokio::test]
    async fn test_signed_in_write_updates_only_remote_field() {
        let mut p = policy();
        p.on_identity_established(anna()).await.unwrap();
        assert_eq!(p.authoritative_store(), StoreKind::Remote);

        let shops = vec![shop("s1")];
        p.write(&shops).await;

        let profile = p.remote().inner.get_profile("u-anna").unwrap().unwrap();
        assert_eq!(profile.shops, shops);
        assert!(profile.brews.is_empty());
        assert!(p.local().get_local("coffee_shops").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guest_brew_migrates_on_first_sign_in() {
        let mut p = policy();
        p.on_identity_cleared();
        p.write(&[brew("b1")]).await;

        let event = p.on_identity_established(anna()).await.unwrap().unwrap();

        let profile = p.remote().inner.get_profile("u-anna").unwrap().unwrap();
        assert_eq!(profile.brews, vec![brew("b1")]);
        assert_eq!(profile.points, 0);
        assert!(p.local().get_local("coffee_brews").unwrap().is_none());
        assert_eq!(event.collections().brews, vec![brew("b1")]);
        assert_eq!(
            p.last_migration(),
            Some(MigrationOutcome::Migrated(Stats {
                brews: 1,
                drinks: 0,
                shops: 0
            }))
        );
    }

    #[tokio::test]
    async fn test_migration_resets_points_on_empty_profile() {
        let mut p = policy();
        p.remote()
            .inner
            .put_profile(
                "u-anna",
                &UserProfile {
                    points: 35,
                    ..UserProfile::default()
                },
            )
            .unwrap();
        p.write(&[shop("s1")]).await;

        p.on_identity_established(anna()).await.unwrap();

        let profile = p.remote().inner.get_profile("u-anna").unwrap().unwrap();
        assert_eq!(profile.points, 0);
        assert_eq!(profile.shops, vec![shop("s1")]);
        assert_eq!(p.cached_points(), 0);
    }

    #[tokio::test]
    async fn test_no_migration_when_remote_has_data() {
        let mut p = policy();
        let cloud = UserProfile {
            points: 40,
            drinks: vec![Drink {
                id: "d-cloud".to_string(),
                drink_name: "Cappuccino".to_string(),
                recipe: "thirds".to_string(),
            }],
            ..UserProfile::default()
        };
        p.remote().inner.put_profile("u-anna", &cloud).unwrap();
        p.write(&[brew("b-local")]).await;

        let event = p.on_identity_established(anna()).await.unwrap().unwrap();

        assert_eq!(event, SyncEvent::DataLoaded(cloud.clone().into_collections()));
        assert_eq!(p.remote().inner.get_profile("u-anna").unwrap().unwrap(), cloud);
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), vec![brew("b-local")]);
        assert_eq!(p.last_migration(), Some(MigrationOutcome::RemoteHasData));
        assert_eq!(p.cached_points(), 40);
    }

    #[tokio::test]
    async fn test_empty_both_sides_leaves_points_alone() {
        let mut p = policy();
        p.remote()
            .inner
            .put_profile(
                "u-anna",
                &UserProfile {
                    points: 12,
                    ..UserProfile::default()
                },
            )
            .unwrap();

        p.on_identity_established(anna()).await.unwrap();

        assert_eq!(p.remote().inner.get_profile("u-anna").unwrap().unwrap().points, 12);
        assert_eq!(p.last_migration(), Some(MigrationOutcome::NothingToMigrate));
    }

    #[tokio::test]
    async fn test_migration_happens_at_most_once() {
        let mut p = policy();
        p.write(&[brew("b1")]).await;
        p.on_identity_established(anna()).await.unwrap();
        p.on_identity_cleared();

        // A new guest session on the same device
        p.write(&[brew("b2")]).await;
        p.on_identity_established(anna()).await.unwrap();

        let profile = p.remote().inner.get_profile("u-anna").unwrap().unwrap();
        assert_eq!(profile.brews, vec![brew("b1")]);
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), vec![brew("b2")]);
        assert_eq!(p.last_migration(), Some(MigrationOutcome::RemoteHasData));
    }

    #[tokio::test]
    async fn test_sign_out_reloads_local_data_only() {
        let mut p = policy();
        p.write(&[shop("s-guest")]).await;
        p.remote()
            .inner
            .put_profile(
                "u-anna",
                &UserProfile {
                    brews: vec![brew("b-cloud")],
                    ..UserProfile::default()
                },
            )
            .unwrap();
        p.on_identity_established(anna()).await.unwrap();
        p.write(&[brew("b-cloud"), brew("b-new")]).await;

        let event = p.on_identity_cleared().unwrap();

        let expected = Collections {
            shops: vec![shop("s-guest")],
            ..Collections::default()
        };
        assert_eq!(event, SyncEvent::DataCleared(expected));
        assert!(p.local().get_local("coffee_brews").unwrap().is_none());
        assert_eq!(p.authoritative_store(), StoreKind::Local);
        assert_eq!(p.cached_points(), 0);
    }

    #[tokio::test]
    async fn test_repeated_transitions_are_ignored() {
        let mut p = policy();
        assert!(p.on_identity_established(anna()).await.unwrap().is_some());
        assert!(p.on_identity_established(anna()).await.unwrap().is_none());
        assert!(p.on_identity_cleared().is_some());
        assert!(p.on_identity_cleared().is_none());
    }

    #[tokio::test]
    async fn test_switching_user_without_sign_out_fails() {
        let mut p = policy();
        p.on_identity_established(anna()).await.unwrap();

        let result = p.on_identity_established(Identity::new("u-ben")).await;
        assert!(result.is_err());
        assert_eq!(p.identity().unwrap().uid, "u-anna");
        assert!(p.remote().inner.get_profile("u-ben").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grant_points_for_guest_is_noop() {
        let p = policy();
        assert_eq!(p.grant_points(20).await, None);
        assert_eq!(p.cached_points(), 0);
    }

    #[tokio::test]
    async fn test_grant_points_accumulates() {
        let mut p = policy();
        p.on_identity_established(anna()).await.unwrap();

        assert_eq!(p.grant_points(5).await, Some(5));
        assert_eq!(p.grant_points(20).await, Some(25));
        assert_eq!(p.cached_points(), 25);
        assert_eq!(p.remote().inner.get_profile("u-anna").unwrap().unwrap().points, 25);
    }

    #[tokio::test]
    async fn test_grant_points_failure_is_swallowed() {
        let mut p = policy();
        p.on_identity_established(anna()).await.unwrap();
        p.remote().fail_updates.set(true);

        assert_eq!(p.grant_points(10).await, None);
        assert_eq!(p.cached_points(), 0);
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_local_data() {
        let mut p = policy();
        p.write(&[brew("b1")]).await;
        p.remote()
            .inner
            .put_profile("u-anna", &UserProfile::default())
            .unwrap();
        p.remote().fail_updates.set(true);

        let event = p.on_identity_established(anna()).await.unwrap().unwrap();

        assert_eq!(event, SyncEvent::DataLoaded(Collections::default()));
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), vec![brew("b1")]);
        assert_eq!(p.last_migration(), None);
        assert!(p.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_unreachable_remote_yields_empty_collections() {
        let mut p = policy();
        p.write(&[brew("b1")]).await;
        p.remote().fail_gets.set(true);

        let event = p.on_identity_established(anna()).await.unwrap().unwrap();

        assert_eq!(event, SyncEvent::DataLoaded(Collections::default()));
        assert_eq!(read_local::<Brew>(p.local()).unwrap(), vec![brew("b1")]);
    }

    #[tokio::test]
    async fn test_failed_remote_write_does_not_touch_local() {
        let mut p = policy();
        p.on_identity_established(anna()).await.unwrap();
        p.remote().fail_updates.set(true);

        assert!(p.try_write(&[brew("b1")]).await.is_err());
        p.write(&[brew("b1")]).await;
        assert!(p.local().get_local("coffee_brews").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listeners_receive_events() {
        let seen: Rc<RefCell<Vec<SyncEvent>>> = Rc::default();
        let mut p = policy();
        let sink = Rc::clone(&seen);
        p.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        p.observe(Some(anna())).await.unwrap();
        p.observe(None).await.unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], SyncEvent::DataLoaded(_)));
        assert!(matches!(seen[1], SyncEvent::DataCleared(_)));
    }
}
