// ── Reactive device mirror ──
//
// One `watch` channel per configured box, indexed by key in a `DashMap`.
// Every mutation replaces the `Arc<DeviceState>` and notifies watchers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moodo_api::RemoteBox;
use tokio::sync::watch;
use tracing::trace;

use crate::model::{DeviceKey, DeviceState, ObservedState, UpdateSource};
use crate::stream::DeviceStream;

/// Concurrent mirror of every configured box.
///
/// Entries are created up front and never removed. Reads are cheap `Arc`
/// clones; writes take the shard lock for the duration of one replace.
pub struct DeviceStore {
    devices: DashMap<DeviceKey, watch::Sender<Arc<DeviceState>>>,
    last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_push_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore {
    pub fn new() -> Self {
        let (last_full_refresh, _) = watch::channel(None);
        let (last_push_event, _) = watch::channel(None);

        Self {
            devices: DashMap::new(),
            last_full_refresh,
            last_push_event,
        }
    }

    /// Create an `Uninitialized` entry for `key`. Returns `false` if it existed.
    pub fn register(&self, key: DeviceKey) -> bool {
        if self.devices.contains_key(&key) {
            return false;
        }
        let (tx, _) = watch::channel(Arc::new(DeviceState::new(key)));
        self.devices.insert(key, tx);
        true
    }

    pub fn contains(&self, key: DeviceKey) -> bool {
        self.devices.contains_key(&key)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: DeviceKey) -> Option<Arc<DeviceState>> {
        self.devices.get(&key).map(|tx| tx.borrow().clone())
    }

    pub fn observed(&self, key: DeviceKey) -> Option<ObservedState> {
        self.get(key).map(|state| state.observed())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.devices.iter().map(|r| *r.key()).collect();
        keys.sort_unstable();
        keys
    }

    /// Every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<Arc<DeviceState>> {
        let mut all: Vec<Arc<DeviceState>> =
            self.devices.iter().map(|r| r.value().borrow().clone()).collect();
        all.sort_unstable_by_key(|state| state.key);
        all
    }

    /// Subscribe to changes of a single box.
    pub fn subscribe(&self, key: DeviceKey) -> Option<DeviceStream> {
        self.devices
            .get(&key)
            .map(|tx| DeviceStream::new(tx.subscribe()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of entries that received at least one remote snapshot.
    pub fn synced_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|r| r.value().borrow().is_synced())
            .count()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Overwrite an entry from a full remote snapshot.
    ///
    /// Returns `false` when the key is not configured; nothing changes then.
    pub fn apply_remote_snapshot(&self, remote: &RemoteBox, source: UpdateSource) -> bool {
        let key = DeviceKey::new(remote.device_key);
        self.mutate(key, source, |state| state.apply_remote(remote))
    }

    /// Apply an optimistic local change.
    pub fn apply_local_change(&self, key: DeviceKey, change: impl FnOnce(&mut DeviceState)) -> bool {
        self.mutate(key, UpdateSource::Local, change)
    }

    /// Re-send the current value so subscribers drop a rejected change.
    pub fn republish(&self, key: DeviceKey) -> bool {
        let Some(tx) = self.devices.get(&key) else {
            return false;
        };
        tx.send_modify(|_| {});
        trace!(device_key = %key, "republished");
        true
    }

    fn mutate(
        &self,
        key: DeviceKey,
        source: UpdateSource,
        change: impl FnOnce(&mut DeviceState),
    ) -> bool {
        let Some(tx) = self.devices.get(&key) else {
            return false;
        };

        let mut next = DeviceState::clone(&tx.borrow());
        change(&mut next);
        next.updated_at = Some(Utc::now());
        next.source = Some(source);
        tx.send_replace(Arc::new(next));

        trace!(device_key = %key, %source, "mirror updated");
        true
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub(crate) fn mark_full_refresh(&self) {
        self.last_full_refresh.send_replace(Some(Utc::now()));
    }

    pub(crate) fn mark_push_event(&self) {
        self.last_push_event.send_replace(Some(Utc::now()));
    }

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_push_event(&self) -> Option<DateTime<Utc>> {
        *self.last_push_event.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::SLOT_COUNT;
    use serde_json::json;

    fn remote(key: u64, status: u8, speeds: [u32; SLOT_COUNT]) -> RemoteBox {
        let settings: Vec<_> = speeds
            .iter()
            .enumerate()
            .map(|(i, speed)| json!({ "slot_id": i, "fan_speed": speed, "fan_active": *speed > 0 }))
            .collect();
        serde_json::from_value(json!({
            "device_key": key,
            "fan_volume": 50,
            "box_status": status,
            "settings": settings,
        }))
        .unwrap()
    }

    fn store_with(keys: &[u64]) -> DeviceStore {
        let store = DeviceStore::new();
        for key in keys {
            store.register(DeviceKey::new(*key));
        }
        store
    }

    #[test]
    fn register_is_idempotent() {
        let store = DeviceStore::new();
        assert!(store.register(DeviceKey::new(1)));
        assert!(!store.register(DeviceKey::new(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.synced_count(), 0);
    }

    #[test]
    fn snapshot_for_unknown_key_is_ignored() {
        let store = store_with(&[1]);
        assert!(!store.apply_remote_snapshot(&remote(2, 1, [0; 4]), UpdateSource::Push));
        assert!(store.get(DeviceKey::new(2)).is_none());
        assert!(!store.get(DeviceKey::new(1)).unwrap().is_synced());
    }

    #[test]
    fn snapshot_marks_synced_and_records_source() {
        let store = store_with(&[1]);
        assert!(store.apply_remote_snapshot(&remote(1, 1, [40, 0, 60, 0]), UpdateSource::Fetch));

        let state = store.get(DeviceKey::new(1)).unwrap();
        assert!(state.is_synced());
        assert!(state.powered);
        assert_eq!(state.slots.len(), SLOT_COUNT);
        assert_eq!(state.slots[2].speed, 60);
        assert_eq!(state.source, Some(UpdateSource::Fetch));
        assert!(state.updated_at.is_some());
        assert_eq!(store.synced_count(), 1);
    }

    #[test]
    fn local_change_is_visible_to_subscribers() {
        let store = store_with(&[7]);
        let stream = store.subscribe(DeviceKey::new(7)).unwrap();

        store.apply_local_change(DeviceKey::new(7), |s| s.intensity = 33);

        let latest = stream.latest();
        assert_eq!(latest.intensity, 33);
        assert_eq!(latest.source, Some(UpdateSource::Local));
    }

    #[tokio::test]
    async fn republish_notifies_without_changing_value() {
        let store = store_with(&[7]);
        store.apply_remote_snapshot(&remote(7, 1, [10, 0, 0, 0]), UpdateSource::Fetch);
        let mut stream = store.subscribe(DeviceKey::new(7)).unwrap();
        let before = stream.current().clone();

        assert!(store.republish(DeviceKey::new(7)));

        let after = stream.changed().await.unwrap();
        assert_eq!(*after, *before);
        assert!(!store.republish(DeviceKey::new(99)));
    }

    #[test]
    fn keys_and_snapshot_are_sorted() {
        let store = store_with(&[30, 10, 20]);
        let keys: Vec<u64> = store.keys().into_iter().map(DeviceKey::get).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        let snap_keys: Vec<u64> = store.snapshot().iter().map(|s| s.key.get()).collect();
        assert_eq!(snap_keys, vec![10, 20, 30]);
    }

    #[test]
    fn metadata_timestamps_start_empty() {
        let store = DeviceStore::new();
        assert!(store.last_full_refresh().is_none());
        store.mark_full_refresh();
        assert!(store.last_full_refresh().is_some());
        assert!(store.last_push_event().is_none());
        store.mark_push_event();
        assert!(store.last_push_event().is_some());
    }
}
