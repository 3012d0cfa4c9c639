use std::time::Duration;

use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{device::DeviceApi, reading_cache::ReadingCache};

#[derive(Clone)]
pub struct SensorService<D> {
    device: D,
    cache: ReadingCache,
    interval: Duration,
}

impl<D: DeviceApi> SensorService<D> {
    pub fn new(device: D, cache: ReadingCache, interval: Duration) -> Self {
        Self {
            device,
            cache,
            interval,
        }
    }

    /// Fetch one snapshot and publish it. On failure the previous snapshot
    /// stays in place. Returns whether a new snapshot was published.
    pub async fn poll_once(&self) -> bool {
        match self.device.fetch_sensor_data().await {
            Ok(reading) => {
                debug!(sensors = reading.len(), "Sensor snapshot received");
                self.cache.update_sensors(reading);
                true
            }
            Err(e) => {
                warn!(error = %e, "Sensor poll failed; keeping last snapshot");
                false
            }
        }
    }

    /// Poll until `cancel` fires.
    ///
    /// The interval is the gap after each call completes, so a slow reply
    /// pushes the next tick out. Cancellation is checked before each call
    /// and during the gap; a call already in flight is allowed to finish.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "Sensor polling started");

        while !cancel.is_cancelled() {
            self.poll_once().await;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = time::sleep(self.interval) => {}
            }
        }

        info!("Sensor polling stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
}

/// Start/stop handle for the polling loop, owned by whatever surface shows
/// the readings. Dropping the handle stops the loop.
pub struct SensorPoller<D> {
    service: SensorService<D>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl<D> SensorPoller<D>
where
    D: DeviceApi + Clone + 'static,
{
    pub fn new(service: SensorService<D>) -> Self {
        Self {
            service,
            running: None,
        }
    }

    /// Begin polling. The loop also ends when `lifecycle` is cancelled.
    /// Starting a running poller is a no-op.
    pub fn start(&mut self, lifecycle: &CancellationToken) {
        if self.state() == PollerState::Running {
            return;
        }

        let token = lifecycle.child_token();
        let handle = tokio::spawn(self.service.clone().run(token.clone()));
        self.running = Some((token, handle));
    }

    /// Stop scheduling further polls. Returns the loop's task so the caller
    /// may wait for an in-flight request to finish.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.running.take().map(|(token, handle)| {
            token.cancel();
            handle
        })
    }

    pub fn state(&self) -> PollerState {
        match &self.running {
            Some((token, handle)) if !token.is_cancelled() && !handle.is_finished() => {
                PollerState::Running
            }
            _ => PollerState::Stopped,
        }
    }
}

impl<D> Drop for SensorPoller<D> {
    fn drop(&mut self) {
        if let Some((token, _)) = &self.running {
            token.cancel();
        }
    }
}
