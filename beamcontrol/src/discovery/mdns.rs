//! mDNS browsing for Chromecast and AirPlay endpoints.
//!
//! Both device families advertise over multicast DNS rather than SSDP.
//! Each service type gets its own browse thread; resolved services are
//! upserted into the directory as they arrive. A refresh restarts the
//! browse round so every endpoint re-resolves into the cleared directory.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tracing::{debug, warn};

use super::stable_hash;
use crate::airplay_client::DEFAULT_AIRPLAY_PORT;
use crate::castv2::DEFAULT_CHROMECAST_PORT;
use crate::model::{DeviceCapabilities, DeviceId, DeviceInfo, DeviceType};
use crate::registry::SharedDirectory;

/// Drain cadence; also bounds how late a stop/refresh is observed.
const RECV_TICK: Duration = Duration::from_millis(500);

pub(crate) fn spawn_browse_thread(
    service_type: &'static str,
    device_type: DeviceType,
    directory: SharedDirectory,
    stop: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("mdns-{}", device_type.as_str()))
        .spawn(move || browse_loop(service_type, device_type, directory, stop, generation))
        .expect("failed to spawn mdns browse thread")
}

fn browse_loop(
    service_type: &'static str,
    device_type: DeviceType,
    directory: SharedDirectory,
    stop: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
) {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            warn!("mDNS daemon unavailable for {}: {}", service_type, e);
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        let browse_generation = generation.load(Ordering::Relaxed);
        let receiver = match daemon.browse(service_type) {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!("mDNS browse failed for {}: {}", service_type, e);
                break;
            }
        };

        // One browse round: drain events until stopped or a refresh bumps
        // the generation, then re-browse so everything resolves again.
        loop {
            if stop.load(Ordering::Relaxed) {
                let _ = daemon.stop_browse(service_type);
                let _ = daemon.shutdown();
                return;
            }
            if generation.load(Ordering::Relaxed) != browse_generation {
                break;
            }
            match receiver.recv_timeout(RECV_TICK) {
                Ok(ServiceEvent::ServiceResolved(service)) => {
                    if let Some(device) = device_from_resolved(device_type, &service) {
                        debug!(
                            id = %device.id,
                            name = device.name.as_str(),
                            address = device.address.as_str(),
                            port = device.port,
                            "mDNS resolved endpoint"
                        );
                        directory.lock().unwrap().upsert(device);
                    }
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }

        let _ = daemon.stop_browse(service_type);
    }

    let _ = daemon.shutdown();
}

/// Builds a directory entry from a resolved mDNS service.
fn device_from_resolved(
    device_type: DeviceType,
    service: &mdns_sd::ResolvedService,
) -> Option<DeviceInfo> {
    // Prefer IPv4; cast endpoints all answer on it and it keeps media URLs
    // simple.
    let mut v4_addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
    v4_addresses.sort();
    let address = v4_addresses.first().map(ToString::to_string)?;

    let fullname = service.get_fullname().to_string();
    let fallback_name = instance_name(&fullname);
    let name = service
        .get_property_val_str("fn")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or(fallback_name);

    let default_port = match device_type {
        DeviceType::Chromecast => DEFAULT_CHROMECAST_PORT,
        DeviceType::AirPlay => DEFAULT_AIRPLAY_PORT,
        DeviceType::Dlna => return None,
    };
    let port = match service.get_port() {
        0 => default_port,
        port => port,
    };

    let capabilities = match device_type {
        DeviceType::Chromecast => DeviceCapabilities::chromecast_defaults(),
        DeviceType::AirPlay => DeviceCapabilities::airplay_defaults(),
        DeviceType::Dlna => return None,
    };

    Some(DeviceInfo {
        id: DeviceId(format!(
            "{}-{:016x}",
            device_type.as_str(),
            stable_hash(&fullname)
        )),
        name,
        device_type,
        address,
        port,
        capabilities,
        av_transport_url: None,
        rendering_control_url: None,
    })
}

/// Instance label of an mDNS fullname
/// (`Bedroom._googlecast._tcp.local.` → `Bedroom`).
fn instance_name(fullname: &str) -> String {
    fullname
        .split("._")
        .next()
        .unwrap_or(fullname)
        .trim_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_strips_service_suffix() {
        assert_eq!(
            instance_name("Bedroom TV._googlecast._tcp.local."),
            "Bedroom TV"
        );
        assert_eq!(instance_name("Apple TV._airplay._tcp.local."), "Apple TV");
        assert_eq!(instance_name("plain"), "plain");
    }

    #[test]
    fn ids_are_stable_per_service_name() {
        let a = format!("chromecast-{:016x}", stable_hash("X._googlecast._tcp.local."));
        let b = format!("chromecast-{:016x}", stable_hash("X._googlecast._tcp.local."));
        assert_eq!(a, b);
    }
}
