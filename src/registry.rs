//! Device registry holding the current fleet snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::model::Device;

/// Fleet list shared between the fleet-sync timer and the polling engine.
///
/// The list is never mutated in place. [`DeviceRegistry::replace`] swaps in a
/// new `Arc`, so a cycle holding a [`DeviceRegistry::snapshot`] keeps seeing
/// the set it started with.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: ArcSwap<Vec<Device>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with `devices`.
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: ArcSwap::from_pointee(devices),
        }
    }

    /// Stable reference to the current fleet.
    pub fn snapshot(&self) -> Arc<Vec<Device>> {
        self.devices.load_full()
    }

    /// Replace the whole fleet.
    pub fn replace(&self, devices: Vec<Device>) {
        let count = devices.len();
        self.devices.store(Arc::new(devices));
        tracing::debug!(count, "Device registry replaced");
    }

    pub fn len(&self) -> usize {
        self.devices.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_replace() {
        let registry = DeviceRegistry::with_devices(vec![
            Device::new("a", "10.0.0.1"),
            Device::new("b", "10.0.0.2"),
        ]);

        let before = registry.snapshot();
        registry.replace(vec![Device::new("c", "10.0.0.3")]);

        assert_eq!(before.len(), 2);
        assert_eq!(before[0].id, "a");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id, "c");
    }

    #[test]
    fn test_empty_registry() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_replace_and_read() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    if i % 2 == 0 {
                        let devices = (0..=j % 5)
                            .map(|k| Device::new(format!("d{k}"), "127.0.0.1"))
                            .collect();
                        registry.replace(devices);
                    } else {
                        let snapshot = registry.snapshot();
                        // Every published list is a prefix d0..dn.
                        for (k, device) in snapshot.iter().enumerate() {
                            assert_eq!(device.id, format!("d{k}"));
                        }
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.len() <= 5);
    }
}
