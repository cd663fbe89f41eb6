//! Shared runtime state for the ingestion pipeline and status interface.

use crate::sensors::DeviceStateStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide count of successfully decoded messages.
///
/// Cloning yields another handle to the same counter. Reads never take the
/// device store lock.
#[derive(Debug, Clone, Default)]
pub struct EventCounter(Arc<AtomicU64>);

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one decoded message and return the new total.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by the pipeline and every status observer.
#[derive(Debug, Default)]
pub struct MonitorContext {
    pub devices: Arc<DeviceStateStore>,
    pub counter: EventCounter,
}

impl MonitorContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_clones_share_value() {
        let counter = EventCounter::new();
        let reader = counter.clone();
        assert_eq!(reader.get(), 0);

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(reader.get(), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = EventCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 8000);
    }
}
