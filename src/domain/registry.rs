use crate::domain::models::{AdvertisingEvent, DeviceAddress, DeviceRecord};
use std::collections::HashMap;
use tracing::debug;

/// Peers observed during the current scan session, keyed by address
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceAddress, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one advertising event. Returns true if the address was new.
    pub fn observe(&mut self, event: &AdvertisingEvent) -> bool {
        match self.devices.get_mut(&event.address) {
            Some(record) => {
                record.last_rssi = event.rssi;
                record.last_seen = event.timestamp;
                record.best_rssi = record.best_rssi.max(event.rssi);
                if record.name.is_none() {
                    if let Some(name) = &event.data.local_name {
                        debug!("Name for {}: {}", record.address, name);
                        record.name = Some(name.clone());
                    }
                }
                false
            }
            None => {
                debug!(
                    "New device {} ({} dBm, {:?})",
                    event.address, event.rssi, event.data.local_name
                );
                self.devices.insert(
                    event.address,
                    DeviceRecord {
                        address: event.address,
                        address_type: event.address.kind(),
                        last_rssi: event.rssi,
                        best_rssi: event.rssi,
                        name: event.data.local_name.clone(),
                        first_seen: event.timestamp,
                        last_seen: event.timestamp,
                    },
                );
                true
            }
        }
    }

    /// Records sorted by best RSSI (strongest first), then first sighting
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        records.sort_by(|a, b| {
            b.best_rssi
                .cmp(&a.best_rssi)
                .then(a.first_seen.cmp(&b.first_seen))
                .then(a.address.cmp(&b.address))
        });
        records
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&DeviceRecord> {
        self.devices.get(address)
    }

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
    use crate::domain::advertising::AdvertisingRecord;
    use crate::domain::models::{AddressType, AdvertisingType};
    use std::time::{Duration, Instant};

    fn event(last_byte: u8, rssi: i8, name: Option<&str>, at: Instant) -> AdvertisingEvent {
        AdvertisingEvent {
            address: DeviceAddress::new([1, 2, 3, 4, 5, last_byte], AddressType::Random),
            rssi,
            advertising_type: AdvertisingType::Connectable,
            data: AdvertisingRecord {
                local_name: name.map(str::to_string),
                ..Default::default()
            },
            timestamp: at,
        }
    }

    #[test]
    fn test_first_observation_inserts() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        assert!(registry.observe(&event(1, -70, Some("Tag"), now)));

        let record = registry.get(&event(1, 0, None, now).address).unwrap();
        assert_eq!(record.first_seen, now);
        assert_eq!(record.last_seen, now);
        assert_eq!(record.best_rssi, -70);
        assert_eq!(record.last_rssi, -70);
        assert_eq!(record.name.as_deref(), Some("Tag"));
        assert_eq!(record.address_type, AddressType::Random);
    }

    #[test]
    fn test_merge_tracks_best_and_last_rssi() {
        let mut registry = DeviceRegistry::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(100);
        let t2 = t0 + Duration::from_millis(200);

        registry.observe(&event(1, -70, None, t0));
        assert!(!registry.observe(&event(1, -60, None, t1)));

        let record = &registry.snapshot()[0];
        assert_eq!(record.best_rssi, -60);
        assert_eq!(record.last_rssi, -60);
        assert_eq!(record.first_seen, t0);
        assert_eq!(record.last_seen, t1);

        registry.observe(&event(1, -80, None, t2));
        let record = &registry.snapshot()[0];
        assert_eq!(record.best_rssi, -60);
        assert_eq!(record.last_rssi, -80);
        assert_eq!(record.last_seen, t2);
    }

    #[test]
    fn test_name_is_filled_once() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        registry.observe(&event(1, -70, None, now));
        registry.observe(&event(1, -70, Some("First"), now));
        registry.observe(&event(1, -70, Some("Second"), now));
        assert_eq!(registry.snapshot()[0].name.as_deref(), Some("First"));
    }

    #[test]
    fn test_empty_name_structure_leaves_name_open() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        let mut first = event(1, -70, None, now);
        first.data = AdvertisingRecord::decode(&[0x01, 0x09]);
        let mut second = event(1, -70, None, now);
        second.data = AdvertisingRecord::decode(&[0x04, 0x09, b'A', b'B', b'C']);

        registry.observe(&first);
        assert!(registry.snapshot()[0].name.is_none());
        registry.observe(&second);
        assert_eq!(registry.snapshot()[0].name.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_snapshot_ordering() {
        let mut registry = DeviceRegistry::new();
        let t0 = Instant::now();
        registry.observe(&event(1, -80, None, t0));
        registry.observe(&event(2, -50, None, t0 + Duration::from_millis(10)));
        registry.observe(&event(3, -50, None, t0 + Duration::from_millis(5)));
        registry.observe(&event(4, -65, None, t0));

        let order: Vec<u8> = registry
            .snapshot()
            .iter()
            .map(|r| r.address.bytes()[5])
            .collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn test_clear() {
        let mut registry = DeviceRegistry::new();
        registry.observe(&event(1, -70, None, Instant::now()));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
