use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;

use crate::protocol::{self, SystemConfig};
use crate::util::host::HostEvents;
use crate::util::transport::Transport;

pub mod library;

use library::{product_for, Capabilities, ProductInfo};

/// Sentinel for string metadata until a device reports real values.
const UNKNOWN: &str = "unknown";

/// How long to wait for a `getSystemConfig` answer before asking again.
const CONFIG_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

/// Metadata fetch attempts before a device is left in a degraded state.
const MAX_CONFIG_RETRIES: u8 = 3;

/// A single discovered device.
///
/// Identity is fixed at creation; the network address tracks the most
/// recent response. Metadata is filled exactly once, by the first
/// successful `getSystemConfig` answer, and `announced` can only flip to
/// true after that fill.
#[derive(Debug)]
pub struct DeviceRecord {
    id: String,
    ip: IpAddr,
    port: u16,
    home_id: u32,
    fw_version: String,
    room_id: u32,
    group_id: u32,
    model_name: String,
    capabilities: Capabilities,
    product: Option<&'static ProductInfo>,
    metadata_loaded: bool,
    announced: bool,
    metadata_retries: u8,
    last_metadata_request: Option<Instant>,
    degraded_logged: bool,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        DeviceRecord {
            id: id.into(),
            ip,
            port,
            home_id: 0,
            fw_version: UNKNOWN.to_string(),
            room_id: 0,
            group_id: 0,
            model_name: UNKNOWN.to_string(),
            capabilities: Capabilities::default(),
            product: None,
            metadata_loaded: false,
            announced: false,
            metadata_retries: 0,
            last_metadata_request: None,
            degraded_logged: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.ip, self.port))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn fw_version(&self) -> &str {
        &self.fw_version
    }

    pub fn home_id(&self) -> u32 {
        self.home_id
    }

    pub fn room_id(&self) -> u32 {
        self.room_id
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn product(&self) -> Option<&'static ProductInfo> {
        self.product
    }

    pub fn metadata_loaded(&self) -> bool {
        self.metadata_loaded
    }

    pub fn announced(&self) -> bool {
        self.announced
    }

    pub fn metadata_retries(&self) -> u8 {
        self.metadata_retries
    }

    /// Newer responses may carry a fresher source address. Identity never
    /// changes.
    pub fn refresh_address(&mut self, ip: IpAddr, port: u16) {
        self.ip = ip;
        self.port = port;
    }

    /// One-time metadata fill: the first successful response wins, later
    /// ones are ignored. Capability flags are derived here, once, from the
    /// reported module name.
    pub fn apply_system_config(&mut self, config: &SystemConfig, host: &dyn HostEvents) {
        if self.metadata_loaded {
            return;
        }
        self.home_id = config.home_id.unwrap_or(0);
        self.room_id = config.room_id.unwrap_or(0);
        self.group_id = config.group_id.unwrap_or(0);
        if let Some(fw_version) = &config.fw_version {
            self.fw_version = fw_version.clone();
        }
        if let Some(module_name) = &config.module_name {
            self.model_name = module_name.clone();
        }
        self.capabilities = Capabilities::from_module_name(&self.model_name);
        self.product = product_for(&self.model_name);
        self.metadata_loaded = true;
        host.publish_device_update(self);
    }

    /// Per-device periodic behavior, called once per host update cycle.
    ///
    /// Requests metadata with bounded retries while it is missing, and
    /// performs the one-shot ready announcement once it is loaded.
    pub fn tick(&mut self, now: Instant, transport: &dyn Transport, host: &dyn HostEvents) {
        if !self.metadata_loaded {
            if self.metadata_retries < MAX_CONFIG_RETRIES {
                if self.metadata_request_due(now) {
                    self.last_metadata_request = Some(now);
                    self.metadata_retries += 1;
                    debug!(
                        "{}: requesting system config (attempt {})",
                        self.id, self.metadata_retries
                    );
                    if let Err(err) =
                        transport.send_unicast(self.ip, self.port, &protocol::system_config_query())
                    {
                        warn!("{}: system config request failed: {}", self.id, err);
                    }
                }
            } else if !self.degraded_logged && self.metadata_request_due(now) {
                // The device stays visible and controllable with default
                // capabilities; nothing escalates past this line.
                self.degraded_logged = true;
                warn!(
                    "{}: no system config after {} attempts, capabilities stay unknown",
                    self.id, MAX_CONFIG_RETRIES
                );
            }
        }
        if self.metadata_loaded && !self.announced {
            host.publish_device_update(self);
            host.announce_device_ready(self);
            self.announced = true;
        }
    }

    fn metadata_request_due(&self, now: Instant) -> bool {
        self.last_metadata_request
            .map_or(true, |at| now.saturating_duration_since(at) > CONFIG_RETRY_INTERVAL)
    }

    /// Flattened, serializable view for roster output.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            ip: self.ip.to_string(),
            port: self.port,
            model_name: self.model_name.clone(),
            fw_version: self.fw_version.clone(),
            home_id: self.home_id,
            room_id: self.room_id,
            group_id: self.group_id,
            product_name: self.product.map(|product| product.product_name.to_string()),
            rgb: self.capabilities.rgb,
            tunable_white: self.capabilities.tunable_white,
        }
    }
}

/// What a record looks like to the outside world.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub model_name: String,
    pub fw_version: String,
    pub home_id: u32,
    pub room_id: u32,
    pub group_id: u32,
    pub product_name: Option<String>,
    pub rgb: bool,
    pub tunable_white: bool,
}

/// The set of known devices, keyed by stable id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Registers a device on first sight; later sightings only refresh the
    /// address. Devices re-answer broadcasts every cycle, so the update
    /// path is the common one.
    pub fn upsert(&mut self, id: &str, ip: IpAddr, port: u16, host: &dyn HostEvents) {
        match self.devices.get_mut(id) {
            Some(existing) => existing.refresh_address(ip, port),
            None => {
                let record = DeviceRecord::new(id, ip, port);
                host.register_device(&record);
                self.devices.insert(id.to_string(), record);
            }
        }
    }

    /// Routes a system-config response to its record: by reported MAC when
    /// the payload carries one, by source address otherwise.
    pub fn record_for_config(
        &mut self,
        config: &SystemConfig,
        src_ip: IpAddr,
    ) -> Option<&mut DeviceRecord> {
        if let Some(mac) = &config.mac {
            if self.devices.contains_key(mac.as_str()) {
                return self.devices.get_mut(mac.as_str());
            }
        }
        self.devices.values_mut().find(|record| record.ip == src_ip)
    }

    /// Drives every record's tick. Order across devices is unspecified.
    pub fn tick(&mut self, now: Instant, transport: &dyn Transport, host: &dyn HostEvents) {
        for record in self.devices.values_mut() {
            record.tick(now, transport, host);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::util::host::doubles::RecordingHost;
    use crate::util::transport::doubles::RecordingTransport;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    fn loaded_config() -> SystemConfig {
        SystemConfig {
            mac: Some("a8bb50d46a1c".to_string()),
            home_id: Some(41),
            fw_version: Some("1.21.0".to_string()),
            room_id: Some(3),
            group_id: Some(0),
            module_name: Some("ESP01_SHRGB1C_31".to_string()),
        }
    }

    #[test]
    fn upsert_creates_once_and_refreshes_after() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();

        registry.upsert("a8bb50d46a1c", ip(10), 38899, &host);
        registry.upsert("a8bb50d46a1c", ip(20), 38899, &host);

        assert_eq!(registry.len(), 1);
        assert_eq!(host.registered.borrow().len(), 1);
        assert_eq!(registry.get("a8bb50d46a1c").unwrap().ip(), ip(20));
    }

    #[test]
    fn metadata_is_written_once() {
        let host = RecordingHost::default();
        let mut record = DeviceRecord::new("a8bb50d46a1c", ip(10), 38899);

        record.apply_system_config(&loaded_config(), &host);
        assert!(record.metadata_loaded());
        assert_eq!(record.model_name(), "ESP01_SHRGB1C_31");
        assert!(record.capabilities().rgb);
        assert_eq!(record.product().unwrap().product_name, "RGB Bulb A19");

        let mut second = loaded_config();
        second.module_name = Some("ESP15_SHTW1C_01".to_string());
        record.apply_system_config(&second, &host);
        assert_eq!(record.model_name(), "ESP01_SHRGB1C_31");
        assert!(record.metadata_loaded());
    }

    #[test]
    fn metadata_retries_are_bounded() {
        let host = RecordingHost::default();
        let transport = RecordingTransport::default();
        let mut record = DeviceRecord::new("a8bb50d46a1c", ip(10), 38899);
        let t0 = Instant::now();

        for i in 0..8 {
            record.tick(t0 + Duration::from_millis(i * 2500), &transport, &host);
        }

        assert_eq!(record.metadata_retries(), 3);
        assert_eq!(transport.unicast_count(), 3);
        assert!(!record.metadata_loaded());
        assert!(!record.announced());
    }

    #[test]
    fn metadata_requests_are_spaced_out() {
        let host = RecordingHost::default();
        let transport = RecordingTransport::default();
        let mut record = DeviceRecord::new("a8bb50d46a1c", ip(10), 38899);
        let t0 = Instant::now();

        record.tick(t0, &transport, &host);
        record.tick(t0 + Duration::from_millis(500), &transport, &host);
        record.tick(t0 + Duration::from_millis(1999), &transport, &host);
        assert_eq!(transport.unicast_count(), 1);

        record.tick(t0 + Duration::from_millis(2500), &transport, &host);
        assert_eq!(transport.unicast_count(), 2);
    }

    #[test]
    fn announce_fires_once_and_only_after_metadata() {
        let host = RecordingHost::default();
        let transport = RecordingTransport::default();
        let mut record = DeviceRecord::new("a8bb50d46a1c", ip(10), 38899);
        let t0 = Instant::now();

        record.tick(t0, &transport, &host);
        assert!(host.announced.borrow().is_empty());

        record.apply_system_config(&loaded_config(), &host);
        record.tick(t0 + Duration::from_millis(100), &transport, &host);
        record.tick(t0 + Duration::from_millis(200), &transport, &host);

        assert_eq!(host.announced.borrow().len(), 1);
        assert!(record.announced());
    }

    #[test]
    fn send_failures_do_not_stop_the_tick() {
        let host = RecordingHost::default();
        let transport = RecordingTransport {
            fail_sends: true,
            ..Default::default()
        };
        let mut record = DeviceRecord::new("a8bb50d46a1c", ip(10), 38899);

        record.tick(Instant::now(), &transport, &host);
        assert_eq!(record.metadata_retries(), 1);
    }

    #[test]
    fn config_routing_prefers_mac_over_source_address() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        registry.upsert("a8bb50d46a1c", ip(10), 38899, &host);
        registry.upsert("d8a011223344", ip(11), 38899, &host);

        let config = loaded_config();
        // Response relayed from an address that belongs to the other record.
        let record = registry.record_for_config(&config, ip(11)).unwrap();
        assert_eq!(record.id(), "a8bb50d46a1c");

        let anonymous = SystemConfig {
            mac: None,
            ..loaded_config()
        };
        let record = registry.record_for_config(&anonymous, ip(11)).unwrap();
        assert_eq!(record.id(), "d8a011223344");

        assert!(registry.record_for_config(&anonymous, ip(99)).is_none());
    }
}
