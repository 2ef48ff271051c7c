//! SSDP-side discovery: event filtering, LOCATION de-duplication and
//! description fetching.
//!
//! The receive loop must never block on HTTP, so description fetches go
//! through a small bounded queue to a pool of fetch workers. A LOCATION
//! enters the seen-set when it is first queued and stays there until the
//! next refresh, whether or not the fetch succeeded.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use super::stable_hash;
use crate::model::{DeviceCapabilities, DeviceId, DeviceInfo, DeviceType};
use crate::registry::SharedDirectory;
use beamupnp::description::{fetch_device_description, DeviceDescription};
use beamupnp::ssdp::{SsdpClient, SsdpEvent};

/// Pending description fetches; excess sightings are dropped and retried on
/// the next announce.
const FETCH_QUEUE: usize = 16;
const FETCH_WORKERS: usize = 2;
const WORKER_TICK: Duration = Duration::from_millis(500);

struct FetchTask {
    location: String,
}

pub(crate) fn spawn_ssdp_threads(
    client: Arc<SsdpClient>,
    directory: SharedDirectory,
    seen: Arc<Mutex<HashSet<String>>>,
    stop: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let (fetch_tx, fetch_rx) = bounded::<FetchTask>(FETCH_QUEUE);
    let mut threads = Vec::new();

    for n in 0..FETCH_WORKERS {
        let fetch_rx = fetch_rx.clone();
        let directory = directory.clone();
        let stop = stop.clone();
        threads.push(
            std::thread::Builder::new()
                .name(format!("ssdp-fetch-{}", n))
                .spawn(move || fetch_worker(fetch_rx, directory, stop))
                .expect("failed to spawn ssdp fetch worker"),
        );
    }

    threads.push(
        std::thread::Builder::new()
            .name("ssdp-recv".to_string())
            .spawn(move || {
                client.run_event_loop(&stop, |event| {
                    handle_ssdp_event(event, &seen, &fetch_tx);
                });
            })
            .expect("failed to spawn ssdp receive loop"),
    );

    threads
}

fn handle_ssdp_event(
    event: SsdpEvent,
    seen: &Mutex<HashSet<String>>,
    fetch_tx: &Sender<FetchTask>,
) {
    if !event.target().contains(":device:MediaRenderer:") {
        return;
    }
    let location = event.location().to_string();

    // First sighting of a LOCATION within this run triggers exactly one
    // description fetch; repeats are ignored until a refresh clears the set.
    {
        let mut seen = seen.lock().unwrap();
        if !seen.insert(location.clone()) {
            return;
        }
    }

    debug!(location = location.as_str(), "New MediaRenderer LOCATION");
    if fetch_tx.try_send(FetchTask { location }).is_err() {
        warn!("Description fetch queue full, dropping sighting");
    }
}

fn fetch_worker(fetch_rx: Receiver<FetchTask>, directory: SharedDirectory, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        let task = match fetch_rx.recv_timeout(WORKER_TICK) {
            Ok(task) => task,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match fetch_device_description(&task.location) {
            Ok(description) => {
                let device = device_from_description(&description);
                debug!(id = %device.id, name = device.name.as_str(), "Discovered DLNA renderer");
                directory.lock().unwrap().upsert(device);
            }
            Err(e) => {
                // The LOCATION stays in the seen-set; it will be retried
                // after the next refresh.
                warn!(location = task.location.as_str(), "Description fetch failed: {}", e);
            }
        }
    }
}

/// Directory entry for a parsed MediaRenderer description.
pub fn device_from_description(description: &DeviceDescription) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId(format!("dlna-{:016x}", stable_hash(&description.udn))),
        name: description.friendly_name.clone(),
        device_type: DeviceType::Dlna,
        address: description.base_url.clone(),
        port: description.port,
        capabilities: DeviceCapabilities::dlna_defaults(),
        av_transport_url: description.av_transport_control_url.clone(),
        rendering_control_url: description.rendering_control_control_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn renderer_response(location: &str) -> SsdpEvent {
        SsdpEvent::SearchResponse {
            st: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            usn: "uuid:abc".to_string(),
            location: location.to_string(),
            from: "10.0.0.9:1900".parse::<SocketAddr>().unwrap(),
        }
    }

    #[test]
    fn duplicate_locations_fetch_once() {
        let seen = Mutex::new(HashSet::new());
        let (tx, rx) = bounded(4);

        for _ in 0..3 {
            handle_ssdp_event(renderer_response("http://10.0.0.9/desc.xml"), &seen, &tx);
        }

        assert_eq!(rx.try_iter().count(), 1);
        assert!(seen.lock().unwrap().contains("http://10.0.0.9/desc.xml"));
    }

    #[test]
    fn non_renderer_targets_are_ignored() {
        let seen = Mutex::new(HashSet::new());
        let (tx, rx) = bounded(4);

        let event = SsdpEvent::SearchResponse {
            st: "urn:schemas-upnp-org:device:InternetGatewayDevice:1".to_string(),
            usn: "uuid:x".to_string(),
            location: "http://10.0.0.1/igd.xml".to_string(),
            from: "10.0.0.1:1900".parse::<SocketAddr>().unwrap(),
        };
        handle_ssdp_event(event, &seen, &tx);

        assert_eq!(rx.try_iter().count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn description_maps_to_dlna_device() {
        let description = DeviceDescription {
            friendly_name: "Attic TV".to_string(),
            udn: "uuid:0ddba11".to_string(),
            base_url: "http://10.0.0.9:52235/".to_string(),
            port: 52235,
            av_transport_control_url: Some("http://10.0.0.9:52235/AVTransport/control".to_string()),
            rendering_control_control_url: None,
        };
        let device = device_from_description(&description);
        assert!(device.id.as_str().starts_with("dlna-"));
        assert_eq!(device.device_type, DeviceType::Dlna);
        assert_eq!(device.address, "http://10.0.0.9:52235/");
        assert_eq!(device.port, 52235);
        assert!(device.av_transport_url.is_some());
    }
}
