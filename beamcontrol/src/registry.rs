use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::model::{DeviceId, DeviceInfo};

/// In-memory view of the discovered endpoints.
///
/// The directory is additive within a run: devices are inserted or
/// replaced by id, and only a refresh clears it. All access goes through
/// one lock so callers observe a linearizable map; reads hand out cloned
/// snapshots, never references into the map.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: HashMap<DeviceId, DeviceInfo>,
}

pub type SharedDirectory = Arc<Mutex<DeviceDirectory>>;

pub fn new_shared_directory() -> SharedDirectory {
    Arc::new(Mutex::new(DeviceDirectory::new()))
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace by id. Idempotent.
    pub fn upsert(&mut self, device: DeviceInfo) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn get(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(&DeviceId(id.to_string())).cloned()
    }

    /// Snapshot of all devices, sorted by friendly name with a
    /// case-insensitive id tiebreak.
    pub fn list(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| {
            (a.name.to_lowercase(), a.id.as_str().to_lowercase())
                .cmp(&(b.name.to_lowercase(), b.id.as_str().to_lowercase()))
        });
        devices
    }

    /// Removes every entry. Used by refresh only; an active session keeps
    /// its own copy of the device and is unaffected.
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceCapabilities, DeviceType};

    fn device(id: &str, name: &str, device_type: DeviceType) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId(id.to_string()),
            name: name.to_string(),
            device_type,
            address: "10.0.0.5".to_string(),
            port: 8009,
            capabilities: DeviceCapabilities::chromecast_defaults(),
            av_transport_url: None,
            rendering_control_url: None,
        }
    }

    #[test]
    fn list_sorts_by_name_then_id() {
        let mut directory = DeviceDirectory::new();
        directory.upsert(device("chromecast-1", "Bedroom", DeviceType::Chromecast));
        directory.upsert(device("dlna-1", "Attic TV", DeviceType::Dlna));

        let names: Vec<String> = directory.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Attic TV", "Bedroom"]);
    }

    #[test]
    fn list_tiebreaks_by_id_case_insensitively() {
        let mut directory = DeviceDirectory::new();
        directory.upsert(device("chromecast-B", "TV", DeviceType::Chromecast));
        directory.upsert(device("airplay-a", "tv", DeviceType::AirPlay));

        let ids: Vec<String> = directory.list().into_iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, vec!["airplay-a", "chromecast-B"]);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut directory = DeviceDirectory::new();
        directory.upsert(device("dlna-1", "Old name", DeviceType::Dlna));
        directory.upsert(device("dlna-1", "New name", DeviceType::Dlna));

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("dlna-1").unwrap().name, "New name");
    }

    #[test]
    fn clear_empties_the_directory() {
        let mut directory = DeviceDirectory::new();
        directory.upsert(device("dlna-1", "TV", DeviceType::Dlna));
        directory.clear();
        assert!(directory.is_empty());
        assert!(directory.get("dlna-1").is_none());
    }
}
