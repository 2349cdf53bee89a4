use log::info;

use crate::device::DeviceRecord;

/// Lifecycle callbacks toward the embedding host.
///
/// The host owns the device roster presentation (UI, bridge, whatever sits
/// above); the core reports through this trait instead of reaching into
/// ambient state.
pub trait HostEvents {
    /// A device answered a registration broadcast for the first time.
    fn register_device(&self, record: &DeviceRecord);

    /// A device's metadata or address changed.
    fn publish_device_update(&self, record: &DeviceRecord);

    /// A device finished loading metadata and is ready for control.
    /// Fires exactly once per device.
    fn announce_device_ready(&self, record: &DeviceRecord);
}

/// Log-backed host used by the CLI and by embedders that have no roster of
/// their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHost;

impl HostEvents for LogHost {
    fn register_device(&self, record: &DeviceRecord) {
        info!("registered {} at {}", record.id(), record.addr());
    }

    fn publish_device_update(&self, record: &DeviceRecord) {
        info!(
            "updated {}: module {}, firmware {}",
            record.id(),
            record.model_name(),
            record.fw_version()
        );
    }

    fn announce_device_ready(&self, record: &DeviceRecord) {
        info!("{} is ready for control", record.id());
    }
}

#[cfg(test)]
pub(crate) mod doubles {
    use std::cell::RefCell;

    use super::HostEvents;
    use crate::device::DeviceRecord;

    /// Records lifecycle callbacks by device id.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub registered: RefCell<Vec<String>>,
        pub updated: RefCell<Vec<String>>,
        pub announced: RefCell<Vec<String>>,
    }

    impl HostEvents for RecordingHost {
        fn register_device(&self, record: &DeviceRecord) {
            self.registered.borrow_mut().push(record.id().to_string());
        }

        fn publish_device_update(&self, record: &DeviceRecord) {
            self.updated.borrow_mut().push(record.id().to_string());
        }

        fn announce_device_ready(&self, record: &DeviceRecord) {
            self.announced.borrow_mut().push(record.id().to_string());
        }
    }
}
