// ── Device repository ──
//
// The host owns the list of managed devices; the connector only reads it.
// `InMemoryDeviceRepository` is the stock implementation the CLI fills
// from the config file.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::ManagedDevice;

/// Source of the devices the connector manages.
pub trait DeviceRepository: Send + Sync {
    /// Every managed device, ordered by identifier.
    fn devices(&self) -> Vec<ManagedDevice>;

    fn get(&self, identifier: &str) -> Option<ManagedDevice>;

    /// Bumped on every change. The connector re-reads the device list at
    /// the end of a polling round when this moves.
    fn version(&self) -> u64 {
        0
    }
}

/// Concurrent in-memory repository keyed by device identifier.
pub struct InMemoryDeviceRepository {
    by_id: DashMap<String, Arc<ManagedDevice>>,
    version: watch::Sender<u64>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            by_id: DashMap::new(),
            version,
        }
    }

    /// Insert or replace a device. Returns `true` if the identifier was new.
    pub fn upsert(&self, device: ManagedDevice) -> bool {
        let is_new = self
            .by_id
            .insert(device.identifier.clone(), Arc::new(device))
            .is_none();
        self.bump_version();
        is_new
    }

    pub fn remove(&self, identifier: &str) -> Option<Arc<ManagedDevice>> {
        let removed = self.by_id.remove(identifier).map(|(_, v)| v);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Watch the version counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for InMemoryDeviceRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<ManagedDevice> for InMemoryDeviceRepository {
    fn from_iter<I: IntoIterator<Item = ManagedDevice>>(iter: I) -> Self {
        let repo = Self::new();
        for device in iter {
            repo.upsert(device);
        }
        repo
    }
}

impl DeviceRepository for InMemoryDeviceRepository {
    fn devices(&self) -> Vec<ManagedDevice> {
        let mut devices: Vec<ManagedDevice> =
            self.by_id.iter().map(|r| ManagedDevice::clone(r.value())).collect();
        devices.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        devices
    }

    fn get(&self, identifier: &str) -> Option<ManagedDevice> {
        self.by_id.get(identifier).map(|r| ManagedDevice::clone(r.value()))
    }

    fn version(&self) -> u64 {
        *self.version.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shelly_api::DeviceGeneration;

    use super::*;

    fn device(id: &str) -> ManagedDevice {
        ManagedDevice::new(id, DeviceGeneration::Gen2).with_address("10.0.0.1")
    }

    #[test]
    fn upsert_reports_new_keys() {
        let repo = InMemoryDeviceRepository::new();
        assert!(repo.upsert(device("a")));
        assert!(!repo.upsert(device("a")));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn devices_are_sorted() {
        let repo: InMemoryDeviceRepository = ["c", "a", "b"].into_iter().map(device).collect();
        let ids: Vec<String> = repo.devices().into_iter().map(|d| d.identifier).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn mutations_bump_the_version() {
        let repo = InMemoryDeviceRepository::new();
        let before = repo.version();
        repo.upsert(device("a"));
        assert!(repo.version() > before);

        let after_insert = repo.version();
        assert!(repo.remove("missing").is_none());
        assert_eq!(repo.version(), after_insert);
        assert!(repo.remove("a").is_some());
        assert!(repo.version() > after_insert);
        assert!(repo.is_empty());
    }
}
