//! Endpoint discovery.
//!
//! Two sources feed the device directory in parallel: an mDNS browser for
//! `_googlecast._tcp` and `_airplay._tcp`, and an SSDP search for UPnP
//! MediaRenderer devices. Both run on their own threads for the lifetime of
//! the process; a refresh clears the directory and restarts the sources'
//! per-run state (SSDP seen-set, mDNS browse round).

mod mdns;
mod ssdp;

pub use ssdp::device_from_description;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::model::DeviceType;
use crate::registry::SharedDirectory;
use beamupnp::ssdp::{SsdpClient, MEDIA_RENDERER_ST};

const GOOGLECAST_SERVICE: &str = "_googlecast._tcp.local.";
const AIRPLAY_SERVICE: &str = "_airplay._tcp.local.";

/// M-SEARCH MX value (seconds devices may spread their answers over).
const MSEARCH_MX: u32 = 3;

/// Supervises the discovery sources.
pub struct DiscoveryManager {
    directory: SharedDirectory,
    stop: Arc<AtomicBool>,
    /// Bumped on refresh; the mDNS threads restart their browse round when
    /// they observe a new generation.
    generation: Arc<AtomicU64>,
    ssdp_client: Option<Arc<SsdpClient>>,
    ssdp_seen: Arc<Mutex<HashSet<String>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryManager {
    /// Starts both discovery sources and fires the first search round.
    pub fn start(directory: SharedDirectory) -> Arc<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));
        let ssdp_seen = Arc::new(Mutex::new(HashSet::new()));

        let ssdp_client = match SsdpClient::new() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("SSDP discovery unavailable: {}", e);
                None
            }
        };

        let manager = Arc::new(Self {
            directory: directory.clone(),
            stop: stop.clone(),
            generation: generation.clone(),
            ssdp_client: ssdp_client.clone(),
            ssdp_seen: ssdp_seen.clone(),
            threads: Mutex::new(Vec::new()),
        });

        let mut threads = Vec::new();

        if let Some(client) = ssdp_client {
            threads.extend(ssdp::spawn_ssdp_threads(
                client,
                directory.clone(),
                ssdp_seen,
                stop.clone(),
            ));
        }

        for (service_type, device_type) in [
            (GOOGLECAST_SERVICE, DeviceType::Chromecast),
            (AIRPLAY_SERVICE, DeviceType::AirPlay),
        ] {
            threads.push(mdns::spawn_browse_thread(
                service_type,
                device_type,
                directory.clone(),
                stop.clone(),
                generation.clone(),
            ));
        }

        *manager.threads.lock().unwrap() = threads;

        manager.send_msearch();
        info!("Discovery started");
        manager
    }

    /// Clears the directory and re-runs both sources. The active session,
    /// if any, is owned by the coordinator and survives the wipe.
    pub fn refresh(&self) {
        info!("Refreshing device directory");
        self.directory.lock().unwrap().clear();
        self.ssdp_seen.lock().unwrap().clear();
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.send_msearch();
    }

    /// Signals every discovery thread and waits for them to exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    fn send_msearch(&self) {
        if let Some(client) = &self.ssdp_client {
            if let Err(e) = client.send_msearch(MEDIA_RENDERER_ST, MSEARCH_MX) {
                warn!("M-SEARCH send failed: {}", e);
            }
        }
    }
}

/// Deterministic FNV-1a 64 hash used to derive stable device ids from mDNS
/// service names and SSDP UDNs.
pub fn stable_hash(input: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::stable_hash;

    #[test]
    fn stable_hash_is_deterministic_and_spreads() {
        let a = stable_hash("Bedroom TV._googlecast._tcp.local.");
        let b = stable_hash("Bedroom TV._googlecast._tcp.local.");
        let c = stable_hash("uuid:0ddba11-feed-beef");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn stable_hash_known_vector() {
        // FNV-1a 64 of empty input is the offset basis.
        assert_eq!(stable_hash(""), 0xcbf29ce484222325);
    }
}
