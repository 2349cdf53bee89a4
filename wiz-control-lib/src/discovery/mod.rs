use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::device::DeviceRegistry;
use crate::protocol::{self, Message};
use crate::util::host::HostEvents;
use crate::util::transport::Transport;

/// Broadcast cadence while the network is still being probed.
const INITIAL_DISCOVERY_INTERVAL: Duration = Duration::from_secs(3);

/// Steady-state broadcast cadence, kept forever after probing.
const BROADCAST_INTERVAL: Duration = Duration::from_secs(60);

/// Fast-cadence probes sent before settling into the steady state.
const MAX_INITIAL_ATTEMPTS: u32 = 5;

/// Broadcast timing state.
///
/// The first tick always broadcasts; the next four follow at the fast
/// cadence, everything after at the slow one. There is no terminal state.
#[derive(Debug, Default)]
pub struct BroadcastSchedule {
    attempts: u32,
    last_broadcast: Option<Instant>,
}

impl BroadcastSchedule {
    pub fn current_interval(&self) -> Duration {
        if self.attempts < MAX_INITIAL_ATTEMPTS {
            INITIAL_DISCOVERY_INTERVAL
        } else {
            BROADCAST_INTERVAL
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_broadcast
            .map_or(true, |at| now.saturating_duration_since(at) >= self.current_interval())
    }

    fn mark_sent(&mut self, now: Instant) {
        self.attempts += 1;
        self.last_broadcast = Some(now);
    }
}

/// Discovery state machine: owns the broadcast schedule and routes inbound
/// datagrams to the registry.
///
/// Cooperative and non-blocking; the host calls [`tick`](Self::tick) on its
/// own cycle and feeds received datagrams through
/// [`handle_datagram`](Self::handle_datagram).
#[derive(Debug, Default)]
pub struct DiscoveryService {
    schedule: BroadcastSchedule,
}

impl DiscoveryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self) -> &BroadcastSchedule {
        &self.schedule
    }

    /// Sends at most one registration broadcast per call, when one is due.
    ///
    /// The schedule advances even if the send fails; a lossy cycle is
    /// indistinguishable from a lost datagram anyway.
    pub fn tick(&mut self, now: Instant, transport: &dyn Transport) {
        if !self.schedule.is_due(now) {
            return;
        }
        match transport.broadcast(&protocol::registration_query()) {
            Ok(_) => debug!(
                "sent registration broadcast (attempt {})",
                self.schedule.attempts + 1
            ),
            Err(err) => warn!("registration broadcast failed: {}", err),
        }
        self.schedule.mark_sent(now);
    }

    /// Decodes one inbound datagram and dispatches it.
    ///
    /// Malformed payloads, unrecognized methods and unsuccessful
    /// registrations are logged and dropped; none of them propagate.
    pub fn handle_datagram(
        &self,
        data: &[u8],
        src: SocketAddr,
        registry: &mut DeviceRegistry,
        host: &dyn HostEvents,
    ) {
        let message = match protocol::decode(data) {
            Ok(message) => message,
            Err(err) => {
                debug!("dropping datagram from {}: {}", src, err);
                return;
            }
        };
        match message {
            Message::Registration(result) => {
                if !result.success {
                    debug!("{} declined registration", src);
                    return;
                }
                let id = result.mac.unwrap_or_else(|| src.ip().to_string());
                registry.upsert(&id, src.ip(), src.port(), host);
            }
            Message::SystemConfig(config) => match registry.record_for_config(&config, src.ip()) {
                Some(record) => record.apply_system_config(&config, host),
                None => debug!("system config from unknown device {}", src),
            },
            Message::PilotAck { success } => {
                debug!("{} acknowledged setPilot (success: {})", src, success);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::util::host::doubles::RecordingHost;
    use crate::util::transport::doubles::RecordingTransport;

    fn src(last: u8) -> SocketAddr {
        SocketAddr::from((IpAddr::V4(Ipv4Addr::new(192, 168, 1, last)), 38899))
    }

    #[test]
    fn probing_cadence_then_steady_state() {
        let transport = RecordingTransport::default();
        let mut discovery = DiscoveryService::new();
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        for ms in [0, 3000, 6000, 9000, 12000] {
            discovery.tick(at(ms), &transport);
        }
        assert_eq!(transport.broadcasts.borrow().len(), 5);

        // Probing is over; the fast cadence no longer fires.
        discovery.tick(at(15000), &transport);
        discovery.tick(at(60000), &transport);
        discovery.tick(at(71999), &transport);
        assert_eq!(transport.broadcasts.borrow().len(), 5);

        discovery.tick(at(72000), &transport);
        assert_eq!(transport.broadcasts.borrow().len(), 6);
        assert_eq!(discovery.schedule().attempts(), 6);
    }

    #[test]
    fn ticks_between_intervals_do_not_broadcast() {
        let transport = RecordingTransport::default();
        let mut discovery = DiscoveryService::new();
        let t0 = Instant::now();

        discovery.tick(t0, &transport);
        discovery.tick(t0 + Duration::from_millis(1000), &transport);
        discovery.tick(t0 + Duration::from_millis(2999), &transport);
        assert_eq!(transport.broadcasts.borrow().len(), 1);
    }

    #[test]
    fn schedule_advances_past_send_failures() {
        let transport = RecordingTransport {
            fail_sends: true,
            ..Default::default()
        };
        let mut discovery = DiscoveryService::new();

        discovery.tick(Instant::now(), &transport);
        assert_eq!(discovery.schedule().attempts(), 1);
    }

    #[test]
    fn registration_creates_then_only_refreshes() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();
        let payload =
            br#"{"method":"registration","result":{"success":true,"mac":"a8bb50d46a1c"}}"#;

        discovery.handle_datagram(payload, src(10), &mut registry, &host);
        discovery.handle_datagram(payload, src(23), &mut registry, &host);

        assert_eq!(registry.len(), 1);
        assert_eq!(host.registered.borrow().len(), 1);
        let record = registry.get("a8bb50d46a1c").unwrap();
        assert_eq!(record.ip(), src(23).ip());
    }

    #[test]
    fn unsuccessful_registration_is_ignored() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();

        discovery.handle_datagram(
            br#"{"method":"registration","result":{"success":false}}"#,
            src(10),
            &mut registry,
            &host,
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn registration_without_mac_uses_source_address_as_id() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();

        discovery.handle_datagram(
            br#"{"method":"registration","result":{"success":true}}"#,
            src(10),
            &mut registry,
            &host,
        );
        assert!(registry.get("192.168.1.10").is_some());
    }

    #[test]
    fn system_config_fills_the_matching_record() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();

        discovery.handle_datagram(
            br#"{"method":"registration","result":{"success":true,"mac":"a8bb50d46a1c"}}"#,
            src(10),
            &mut registry,
            &host,
        );
        discovery.handle_datagram(
            br#"{"method":"getSystemConfig","result":{"mac":"a8bb50d46a1c","moduleName":"ESP15_SHTW1C_01","fwVersion":"1.21.0"}}"#,
            src(10),
            &mut registry,
            &host,
        );

        let record = registry.get("a8bb50d46a1c").unwrap();
        assert!(record.metadata_loaded());
        assert!(record.capabilities().tunable_white_only());
        assert_eq!(record.fw_version(), "1.21.0");
    }

    #[test]
    fn junk_datagrams_are_dropped_quietly() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();

        discovery.handle_datagram(b"{not json", src(10), &mut registry, &host);
        discovery.handle_datagram(b"", src(10), &mut registry, &host);
        discovery.handle_datagram(
            br#"{"method":"getPilot","result":{}}"#,
            src(10),
            &mut registry,
            &host,
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn system_config_for_unknown_device_is_a_no_op() {
        let host = RecordingHost::default();
        let mut registry = DeviceRegistry::new();
        let discovery = DiscoveryService::new();

        discovery.handle_datagram(
            br#"{"method":"getSystemConfig","result":{"moduleName":"ESP01_SHRGB1C_31"}}"#,
            src(10),
            &mut registry,
            &host,
        );
        assert!(registry.is_empty());
    }
}
