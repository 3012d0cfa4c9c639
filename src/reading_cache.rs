use std::{collections::HashMap, sync::Arc};

use tokio::sync::{watch, RwLock};

use crate::device::models::{Device, SensorReading};

/// What a control surface currently shows: the latest sensor snapshot and
/// the confirmed status text per device.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Each field has a single writer per update cycle (the poller for the
/// snapshot, the reconciler for statuses).
#[derive(Clone)]
pub struct ReadingCache {
    inner: Arc<Inner>,
}

struct Inner {
    statuses: RwLock<HashMap<Device, String>>,
    door: RwLock<Option<String>>,
    snapshot: watch::Sender<Option<SensorReading>>,
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                statuses: RwLock::default(),
                door: RwLock::default(),
                snapshot: watch::Sender::new(None),
            }),
        }
    }
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sensor snapshot wholesale.
    pub fn update_sensors(&self, reading: SensorReading) {
        self.inner.snapshot.send_replace(Some(reading));
    }

    /// Latest snapshot, `None` until the first successful poll.
    pub fn sensors(&self) -> Option<SensorReading> {
        self.inner.snapshot.borrow().clone()
    }

    /// Change feed of sensor snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Option<SensorReading>> {
        self.inner.snapshot.subscribe()
    }

    pub async fn set_status(&self, device: Device, status: impl Into<String>) {
        self.inner.statuses.write().await.insert(device, status.into());
    }

    /// Displayed status for `device`, `"Unknown"` until first confirmed.
    pub async fn status(&self, device: Device) -> String {
        self.inner
            .statuses
            .read()
            .await
            .get(&device)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_owned())
    }

    pub async fn set_door(&self, status: impl Into<String>) {
        *self.inner.door.write().await = Some(status.into());
    }

    /// Displayed door status, `"Loading..."` until first fetched.
    pub async fn door(&self) -> String {
        self.inner
            .door
            .read()
            .await
            .clone()
            .unwrap_or_else(|| "Loading...".to_owned())
    }
}
