//! The world state store.
//!
//! Sole authority over which Accounts, Characters, Items and Places exist and
//! what they currently hold. Every write goes through [`WorldStore::locked_write`]
//! or one of the delete paths, which:
//!
//! 1. read the current record without locking and work out every key the write
//!    will touch (its footprint),
//! 2. lock that footprint through [`KeyLocks`],
//! 3. re-read, recompute and retry if the footprint moved in the meantime,
//! 4. stage all record changes into one batch and commit it atomically.
//!
//! The locks only order writers inside this process. Every record the batch
//! read is committed on the condition that its revision is unchanged, and a
//! stale commit starts over from step 1, so writers in other processes sharing
//! the same storage cannot overwrite each other either.
//!
//! Reads never lock; they see committed records only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use chasm_domain::{
    Account, AccountName, Character, CharacterName, Coords, EntityKey, Item, ItemLocation,
    ItemName, Place, Record,
};
use serde::de::DeserializeOwned;

use super::error::StoreError;
use super::key_locks::KeyLocks;
use crate::infrastructure::ports::{ClockPort, Expect, RecordKey, RecordWrite, WorldRepo, WriteOp};

/// What happens to occupants when a Place is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceDeletePolicy {
    /// Refuse with a conflict while any Character or Item is there.
    Reject,
    /// Move every occupant to these coordinates first.
    RelocateTo(Coords),
}

/// Record changes committed together, plus the revision of every record they
/// were computed from.
#[derive(Default)]
struct Batch {
    seen: BTreeMap<RecordKey, Option<u64>>,
    changes: BTreeMap<RecordKey, WriteOp>,
}

impl Batch {
    /// Keeps the first revision observed for `key`.
    fn saw(&mut self, key: RecordKey, revision: Option<u64>) {
        self.seen.entry(key).or_insert(revision);
    }

    fn put<R: Record>(&mut self, value: &R) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(value).map_err(|e| StoreError::storage("encode", e))?;
        self.changes
            .insert(RecordKey::from(&value.entity_key()), WriteOp::Put(json));
        Ok(())
    }

    fn delete(&mut self, key: &EntityKey) {
        self.changes.insert(RecordKey::from(key), WriteOp::Delete);
    }

    /// Changes first, then a touch for every record read but left unchanged.
    /// Each write expects the revision its record had when it was read.
    fn into_writes(self) -> Vec<RecordWrite> {
        let Batch { seen, changes } = self;
        let touches: Vec<RecordWrite> = seen
            .iter()
            .filter(|(key, _)| !changes.contains_key(*key))
            .map(|(key, revision)| RecordWrite::touch(key.clone()).expecting((*revision).into()))
            .collect();

        let mut writes: Vec<RecordWrite> = changes
            .into_iter()
            .map(|(key, op)| {
                let expect = seen
                    .get(&key)
                    .map_or(Expect::Any, |revision| Expect::from(*revision));
                RecordWrite { key, op, expect }
            })
            .collect();
        writes.extend(touches);
        writes
    }
}

/// Per-kind rules for writing a record: which keys a write touches and which
/// other records change with it.
#[async_trait]
trait Stored: Record + PartialEq {
    fn footprint(current: Option<&Self>, next: &Self) -> Vec<EntityKey>;

    async fn stage(
        store: &WorldStore,
        current: Option<&Self>,
        next: &Self,
        batch: &mut Batch,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl Stored for Place {
    fn footprint(_current: Option<&Self>, next: &Self) -> Vec<EntityKey> {
        vec![next.entity_key()]
    }

    async fn stage(
        _store: &WorldStore,
        _current: Option<&Self>,
        next: &Self,
        batch: &mut Batch,
    ) -> Result<(), StoreError> {
        batch.put(next)
    }
}

#[async_trait]
impl Stored for Character {
    fn footprint(current: Option<&Self>, next: &Self) -> Vec<EntityKey> {
        let mut keys = vec![next.entity_key()];
        if current.map(|c| c.coords) != Some(next.coords) {
            keys.push(EntityKey::Place(next.coords));
        }
        keys
    }

    async fn stage(
        store: &WorldStore,
        current: Option<&Self>,
        next: &Self,
        batch: &mut Batch,
    ) -> Result<(), StoreError> {
        let empty = BTreeSet::new();
        let mirror = current.map(|c| &c.inventory).unwrap_or(&empty);
        if &next.inventory != mirror {
            return Err(StoreError::validation(format!(
                "Inventory of {} changes only through item moves",
                next.name
            )));
        }
        if current.map(|c| c.coords) != Some(next.coords) {
            store.ensure_place(next.coords, batch).await?;
        }
        batch.put(next)
    }
}

fn location_key(location: &ItemLocation) -> EntityKey {
    match location {
        ItemLocation::Place(coords) => EntityKey::Place(*coords),
        ItemLocation::Holder(name) => EntityKey::Character(name.clone()),
    }
}

#[async_trait]
impl Stored for Item {
    fn footprint(current: Option<&Self>, next: &Self) -> Vec<EntityKey> {
        let mut keys = vec![next.entity_key()];
        let previous = current.map(|item| &item.location);
        if previous != Some(&next.location) {
            keys.push(location_key(&next.location));
            if let Some(ItemLocation::Holder(holder)) = previous {
                keys.push(EntityKey::Character(holder.clone()));
            }
        }
        keys
    }

    async fn stage(
        store: &WorldStore,
        current: Option<&Self>,
        next: &Self,
        batch: &mut Batch,
    ) -> Result<(), StoreError> {
        let previous = current.map(|item| &item.location);
        if previous != Some(&next.location) {
            match &next.location {
                ItemLocation::Place(coords) => store.ensure_place(*coords, batch).await?,
                ItemLocation::Holder(holder) => {
                    let mut character =
                        store.load_tracked::<Character>(holder, batch).await?.ok_or_else(|| {
                        StoreError::validation(format!(
                            "{} cannot be held by missing character {}",
                            next.name, holder
                        ))
                    })?;
                    character.inventory.insert(next.name.clone());
                    batch.put(&character)?;
                }
            }
            if let Some(ItemLocation::Holder(holder)) = previous {
                if let Some(mut character) = store.load_tracked::<Character>(holder, batch).await? {
                    character.inventory.remove(&next.name);
                    batch.put(&character)?;
                }
            }
        }
        batch.put(next)
    }
}

#[async_trait]
impl Stored for Account {
    fn footprint(current: Option<&Self>, next: &Self) -> Vec<EntityKey> {
        let mut keys = vec![next.entity_key()];
        keys.extend(
            next.characters
                .iter()
                .filter(|name| !current.is_some_and(|account| account.owns(name)))
                .cloned()
                .map(EntityKey::Character),
        );
        keys
    }

    async fn stage(
        store: &WorldStore,
        current: Option<&Self>,
        next: &Self,
        batch: &mut Batch,
    ) -> Result<(), StoreError> {
        for name in &next.characters {
            if current.is_some_and(|account| account.owns(name)) {
                continue;
            }
            if store.load_tracked::<Character>(name, batch).await?.is_none() {
                return Err(StoreError::validation(format!(
                    "Account {} cannot own missing character {}",
                    next.name, name
                )));
            }
        }
        batch.put(next)
    }
}

fn decode<R: DeserializeOwned>(key: &impl Display, json: &str) -> Result<R, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::storage("decode", format!("{key}: {e}")))
}

fn ensure_same_key<R: Record>(expected: &EntityKey, value: &R) -> Result<(), StoreError> {
    let actual = value.entity_key();
    if &actual != expected {
        return Err(StoreError::validation(format!(
            "A write to {expected} cannot produce {actual}"
        )));
    }
    Ok(())
}

/// Authoritative world state, shared by the scheduler and the editor.
pub struct WorldStore {
    repo: Arc<dyn WorldRepo>,
    locks: KeyLocks,
    clock: Arc<dyn ClockPort>,
}

impl WorldStore {
    pub fn new(repo: Arc<dyn WorldRepo>, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            repo,
            locks: KeyLocks::new(),
            clock,
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn get_account(&self, name: &AccountName) -> Result<Account, StoreError> {
        self.get(name).await
    }

    pub async fn set_account(&self, account: Account) -> Result<Account, StoreError> {
        self.set(account).await
    }

    pub async fn update_account<F>(&self, name: &AccountName, f: F) -> Result<Account, StoreError>
    where
        F: FnMut(Account) -> Account + Send,
    {
        self.update(name, f).await
    }

    /// Removes the account only; its characters stay in the world, ownerless.
    pub async fn delete_account(&self, name: &AccountName) -> Result<Account, StoreError> {
        let key = EntityKey::Account(name.clone());
        let _guards = self.locks.lock([key.clone()]).await;
        loop {
            let mut batch = Batch::default();
            let account = self.get_tracked::<Account>(name, &mut batch).await?;
            batch.delete(&key);
            if !self.commit(batch).await? {
                continue;
            }
            tracing::info!(
                account = %name,
                orphaned = account.characters.len(),
                "Account deleted"
            );
            return Ok(account);
        }
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.scan().await
    }

    /// The account that owns `character`, if any.
    pub async fn owner_of(&self, character: &CharacterName) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts()
            .await?
            .into_iter()
            .find(|account| account.owns(character)))
    }

    // =========================================================================
    // Characters
    // =========================================================================

    pub async fn get_character(&self, name: &CharacterName) -> Result<Character, StoreError> {
        self.get(name).await
    }

    pub async fn set_character(&self, character: Character) -> Result<Character, StoreError> {
        self.set(character).await
    }

    /// Atomic read-modify-write; an absent character starts from the default
    /// at the origin.
    pub async fn update_character<F>(
        &self,
        name: &CharacterName,
        f: F,
    ) -> Result<Character, StoreError>
    where
        F: FnMut(Character) -> Character + Send,
    {
        self.update(name, f).await
    }

    /// Like `update_character`, but the character must exist and the transform
    /// may refuse.
    pub async fn modify_character<F>(
        &self,
        name: &CharacterName,
        f: F,
    ) -> Result<Character, StoreError>
    where
        F: FnMut(Character) -> Result<Character, StoreError> + Send,
    {
        self.modify(name, f).await
    }

    /// Drops held items at the character's last coordinates and removes it
    /// from any owning account.
    pub async fn delete_character(&self, name: &CharacterName) -> Result<Character, StoreError> {
        loop {
            let observed = self.get::<Character>(name).await?;
            let owners = self.owners(name).await?;
            let guards = self
                .locks
                .lock(Self::character_delete_footprint(&observed, &owners))
                .await;

            let mut batch = Batch::default();
            let character = self.get_tracked::<Character>(name, &mut batch).await?;
            let owners = self.owners_tracked(name, &mut batch).await?;
            if !guards.covers(Self::character_delete_footprint(&character, &owners)) {
                tracing::debug!(character = %name, "Delete footprint changed, retrying");
                continue;
            }

            if !character.inventory.is_empty() {
                self.ensure_place(character.coords, &mut batch).await?;
            }
            for item_name in &character.inventory {
                if let Some(mut item) = self.load_tracked::<Item>(item_name, &mut batch).await? {
                    item.location = ItemLocation::Place(character.coords);
                    batch.put(&item)?;
                }
            }
            for mut account in owners {
                account.characters.remove(name);
                batch.put(&account)?;
            }
            batch.delete(&character.entity_key());
            if !self.commit(batch).await? {
                continue;
            }

            tracing::info!(
                character = %name,
                dropped = character.inventory.len(),
                at = %character.coords,
                "Character deleted"
            );
            return Ok(character);
        }
    }

    fn character_delete_footprint(character: &Character, owners: &[Account]) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = owners.iter().map(Record::entity_key).collect();
        keys.push(character.entity_key());
        keys.extend(character.inventory.iter().cloned().map(EntityKey::Item));
        keys.push(EntityKey::Place(character.coords));
        keys
    }

    async fn owners(&self, character: &CharacterName) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .accounts()
            .await?
            .into_iter()
            .filter(|account| account.owns(character))
            .collect())
    }

    async fn owners_tracked(
        &self,
        character: &CharacterName,
        batch: &mut Batch,
    ) -> Result<Vec<Account>, StoreError> {
        self.scan_tracked(batch, |account: &Account| account.owns(character))
            .await
    }

    pub async fn characters(&self) -> Result<Vec<Character>, StoreError> {
        self.scan().await
    }

    pub async fn characters_at(&self, coords: Coords) -> Result<Vec<Character>, StoreError> {
        Ok(self
            .characters()
            .await?
            .into_iter()
            .filter(|c| c.coords == coords)
            .collect())
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn get_item(&self, name: &ItemName) -> Result<Item, StoreError> {
        self.get(name).await
    }

    /// Creates or replaces an item; a change of holder updates both holders'
    /// inventories in the same commit.
    pub async fn set_item(&self, item: Item) -> Result<Item, StoreError> {
        self.set(item).await
    }

    pub async fn update_item<F>(&self, name: &ItemName, f: F) -> Result<Item, StoreError>
    where
        F: FnMut(Item) -> Item + Send,
    {
        self.update(name, f).await
    }

    /// Relocates an existing item. With `expected_from`, fails with a conflict
    /// unless the item is still there.
    pub async fn move_item(
        &self,
        name: &ItemName,
        to: ItemLocation,
        expected_from: Option<ItemLocation>,
    ) -> Result<Item, StoreError> {
        self.modify(name, |mut item: Item| {
            if let Some(expected) = &expected_from {
                if &item.location != expected {
                    return Err(StoreError::conflict(format!(
                        "{} is {}, not {}",
                        item.name, item.location, expected
                    )));
                }
            }
            item.location = to.clone();
            Ok(item)
        })
        .await
    }

    pub async fn delete_item(&self, name: &ItemName) -> Result<Item, StoreError> {
        loop {
            let observed = self.get::<Item>(name).await?;
            let guards = self.locks.lock(Self::item_delete_footprint(&observed)).await;

            let mut batch = Batch::default();
            let item = self.get_tracked::<Item>(name, &mut batch).await?;
            if !guards.covers(Self::item_delete_footprint(&item)) {
                continue;
            }

            if let ItemLocation::Holder(holder) = &item.location {
                if let Some(mut character) =
                    self.load_tracked::<Character>(holder, &mut batch).await?
                {
                    character.inventory.remove(name);
                    batch.put(&character)?;
                }
            }
            batch.delete(&item.entity_key());
            if !self.commit(batch).await? {
                continue;
            }
            tracing::info!(item = %name, "Item deleted");
            return Ok(item);
        }
    }

    fn item_delete_footprint(item: &Item) -> Vec<EntityKey> {
        let mut keys = vec![item.entity_key()];
        if let ItemLocation::Holder(holder) = &item.location {
            keys.push(EntityKey::Character(holder.clone()));
        }
        keys
    }

    pub async fn items(&self) -> Result<Vec<Item>, StoreError> {
        self.scan().await
    }

    /// Items lying at `coords` (not those carried by characters standing there).
    pub async fn items_at(&self, coords: Coords) -> Result<Vec<Item>, StoreError> {
        let here = ItemLocation::Place(coords);
        Ok(self
            .items()
            .await?
            .into_iter()
            .filter(|item| item.location == here)
            .collect())
    }

    // =========================================================================
    // Places
    // =========================================================================

    pub async fn get_place(&self, coords: Coords) -> Result<Place, StoreError> {
        self.get(&coords).await
    }

    pub async fn set_place(&self, place: Place) -> Result<Place, StoreError> {
        self.set(place).await
    }

    pub async fn update_place<F>(&self, coords: Coords, f: F) -> Result<Place, StoreError>
    where
        F: FnMut(Place) -> Place + Send,
    {
        self.update(&coords, f).await
    }

    pub async fn delete_place(
        &self,
        coords: Coords,
        policy: PlaceDeletePolicy,
    ) -> Result<Place, StoreError> {
        if policy == PlaceDeletePolicy::RelocateTo(coords) {
            return Err(StoreError::validation(format!(
                "Cannot relocate occupants of {coords} onto itself"
            )));
        }

        loop {
            let (characters, items) = self.occupants(coords).await?;
            let guards = self
                .locks
                .lock(Self::place_delete_footprint(coords, policy, &characters, &items))
                .await;

            let mut batch = Batch::default();
            let place = self.get_tracked::<Place>(&coords, &mut batch).await?;
            let (characters, items) = self.occupants_tracked(coords, &mut batch).await?;
            if !guards.covers(Self::place_delete_footprint(
                coords,
                policy,
                &characters,
                &items,
            )) {
                tracing::debug!(%coords, "Occupants changed while locking, retrying");
                continue;
            }

            if !characters.is_empty() || !items.is_empty() {
                match policy {
                    PlaceDeletePolicy::Reject => {
                        return Err(StoreError::conflict(format!(
                            "{} at {} still holds {} character(s) and {} item(s)",
                            place.name,
                            coords,
                            characters.len(),
                            items.len()
                        )));
                    }
                    PlaceDeletePolicy::RelocateTo(target) => {
                        self.ensure_place(target, &mut batch).await?;
                        for mut character in characters.iter().cloned() {
                            character.coords = target;
                            batch.put(&character)?;
                        }
                        for mut item in items.iter().cloned() {
                            item.location = ItemLocation::Place(target);
                            batch.put(&item)?;
                        }
                        tracing::info!(
                            from = %coords,
                            to = %target,
                            characters = characters.len(),
                            items = items.len(),
                            "Relocated occupants of deleted place"
                        );
                    }
                }
            }
            batch.delete(&EntityKey::Place(coords));
            if !self.commit(batch).await? {
                continue;
            }
            tracing::info!(%coords, name = %place.name, "Place deleted");
            return Ok(place);
        }
    }

    fn place_delete_footprint(
        coords: Coords,
        policy: PlaceDeletePolicy,
        characters: &[Character],
        items: &[Item],
    ) -> Vec<EntityKey> {
        let mut keys = vec![EntityKey::Place(coords)];
        if let PlaceDeletePolicy::RelocateTo(target) = policy {
            keys.push(EntityKey::Place(target));
        }
        keys.extend(characters.iter().map(Record::entity_key));
        keys.extend(items.iter().map(Record::entity_key));
        keys
    }

    async fn occupants(&self, coords: Coords) -> Result<(Vec<Character>, Vec<Item>), StoreError> {
        Ok((self.characters_at(coords).await?, self.items_at(coords).await?))
    }

    async fn occupants_tracked(
        &self,
        coords: Coords,
        batch: &mut Batch,
    ) -> Result<(Vec<Character>, Vec<Item>), StoreError> {
        let here = ItemLocation::Place(coords);
        let characters = self
            .scan_tracked(batch, |character: &Character| character.coords == coords)
            .await?;
        let items = self
            .scan_tracked(batch, |item: &Item| item.location == here)
            .await?;
        Ok((characters, items))
    }

    pub async fn places(&self) -> Result<Vec<Place>, StoreError> {
        self.scan().await
    }

    /// Neighbouring coordinates that have a place.
    pub async fn exits(&self, coords: Coords) -> Result<Vec<Coords>, StoreError> {
        let mut exits = Vec::new();
        for neighbour in coords.neighbours() {
            if self.load::<Place>(&neighbour).await?.is_some() {
                exits.push(neighbour);
            }
        }
        Ok(exits)
    }

    // =========================================================================
    // Generic plumbing
    // =========================================================================

    async fn get<R: Record>(&self, key: &R::Key) -> Result<R, StoreError> {
        let entity_key: EntityKey = key.clone().into();
        self.load_key(&entity_key)
            .await?
            .ok_or_else(|| StoreError::not_found(&entity_key))
    }

    async fn set<R: Stored>(&self, value: R) -> Result<R, StoreError> {
        let key = value.key();
        self.locked_write(&key, |_| Ok(value.clone())).await
    }

    async fn update<R, F>(&self, key: &R::Key, mut f: F) -> Result<R, StoreError>
    where
        R: Stored,
        F: FnMut(R) -> R + Send,
    {
        let now = self.clock.now();
        self.locked_write(key, |current: Option<R>| {
            Ok(f(current.unwrap_or_else(|| R::placeholder(key, now))))
        })
        .await
    }

    async fn modify<R, F>(&self, key: &R::Key, mut f: F) -> Result<R, StoreError>
    where
        R: Stored,
        F: FnMut(R) -> Result<R, StoreError> + Send,
    {
        let entity_key: EntityKey = key.clone().into();
        self.locked_write(key, |current: Option<R>| match current {
            Some(value) => f(value),
            None => Err(StoreError::not_found(&entity_key)),
        })
        .await
    }

    /// Read-modify-write of one record and everything it drags along.
    ///
    /// `next` maps the current value (if any) to the value to store. It may be
    /// called more than once, also after a stale commit, and must not have
    /// side effects.
    async fn locked_write<R, F>(&self, key: &R::Key, mut next: F) -> Result<R, StoreError>
    where
        R: Stored,
        F: FnMut(Option<R>) -> Result<R, StoreError> + Send,
    {
        let entity_key: EntityKey = key.clone().into();
        loop {
            let observed = self.load::<R>(key).await?;
            let proposed = next(observed.clone())?;
            ensure_same_key(&entity_key, &proposed)?;
            let guards = self
                .locks
                .lock(R::footprint(observed.as_ref(), &proposed))
                .await;

            let mut batch = Batch::default();
            let current = self.load_tracked::<R>(key, &mut batch).await?;
            let value = next(current.clone())?;
            ensure_same_key(&entity_key, &value)?;
            if !guards.covers(R::footprint(current.as_ref(), &value)) {
                tracing::debug!(key = %entity_key, "Write footprint changed while locking, retrying");
                continue;
            }

            value.validate()?;
            R::stage(self, current.as_ref(), &value, &mut batch).await?;
            if !self.commit(batch).await? {
                continue;
            }
            tracing::debug!(key = %entity_key, "Record written");
            return Ok(value);
        }
    }

    /// Stages the default place at `coords` unless one exists. The caller
    /// holds the Place lock. An existing place is touched, so a concurrent
    /// delete of it goes stale.
    async fn ensure_place(&self, coords: Coords, batch: &mut Batch) -> Result<(), StoreError> {
        if self.load_tracked::<Place>(&coords, batch).await?.is_none() {
            tracing::debug!(%coords, "Creating place on first reference");
            batch.put(&Place::uncharted(coords))?;
        }
        Ok(())
    }

    async fn load<R: Record>(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        self.load_key(&key.clone().into()).await
    }

    async fn load_key<R: Record>(&self, key: &EntityKey) -> Result<Option<R>, StoreError> {
        Ok(self.fetch(key).await?.map(|(value, _)| value))
    }

    /// Loads a record for a write, noting its revision in `batch`.
    async fn load_tracked<R: Record>(
        &self,
        key: &R::Key,
        batch: &mut Batch,
    ) -> Result<Option<R>, StoreError> {
        let entity_key: EntityKey = key.clone().into();
        let fetched = self.fetch::<R>(&entity_key).await?;
        batch.saw(
            RecordKey::from(&entity_key),
            fetched.as_ref().map(|(_, revision)| *revision),
        );
        Ok(fetched.map(|(value, _)| value))
    }

    async fn get_tracked<R: Record>(
        &self,
        key: &R::Key,
        batch: &mut Batch,
    ) -> Result<R, StoreError> {
        let entity_key: EntityKey = key.clone().into();
        self.load_tracked(key, batch)
            .await?
            .ok_or_else(|| StoreError::not_found(&entity_key))
    }

    async fn fetch<R: Record>(&self, key: &EntityKey) -> Result<Option<(R, u64)>, StoreError> {
        let stored = self
            .repo
            .load(&RecordKey::from(key))
            .await
            .map_err(|e| StoreError::storage("load", e))?;
        stored
            .map(|stored| decode(key, &stored.json).map(|value| (value, stored.revision)))
            .transpose()
    }

    async fn scan<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        Ok(self
            .scan_revisions()
            .await?
            .into_iter()
            .map(|(value, _)| value)
            .collect())
    }

    /// Records of one kind matching `keep`, noting their revisions in `batch`.
    async fn scan_tracked<R, P>(&self, batch: &mut Batch, keep: P) -> Result<Vec<R>, StoreError>
    where
        R: Record,
        P: Fn(&R) -> bool + Send,
    {
        let mut kept = Vec::new();
        for (value, revision) in self.scan_revisions::<R>().await? {
            if keep(&value) {
                batch.saw(RecordKey::from(&value.entity_key()), Some(revision));
                kept.push(value);
            }
        }
        Ok(kept)
    }

    async fn scan_revisions<R: Record>(&self) -> Result<Vec<(R, u64)>, StoreError> {
        let rows = self
            .repo
            .scan(R::KIND)
            .await
            .map_err(|e| StoreError::storage("scan", e))?;
        rows.iter()
            .map(|stored| decode(&R::KIND, &stored.json).map(|value| (value, stored.revision)))
            .collect()
    }

    /// Commits `batch`; `false` when another writer changed one of its records
    /// since it was read, in which case nothing was written.
    async fn commit(&self, batch: Batch) -> Result<bool, StoreError> {
        match self.repo.commit(batch.into_writes()).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_stale() => {
                tracing::debug!(error = %e, "Another writer got there first, retrying");
                Ok(false)
            }
            Err(e) => {
                tracing::error!(error = %e, "World commit failed");
                Err(StoreError::storage("commit", e))
            }
        }
    }
}
