use tracing::{info, warn};

use crate::{
    device::{
        models::{Device, DeviceStatus, DoorAction, Endpoint, StatusVocabulary},
        DeviceApi,
    },
    reading_cache::ReadingCache,
};

/// Shown when the door status could not be confirmed outside of a command.
pub const DOOR_STATUS_FAILED: &str = "Failed to fetch status";

/// Drives devices and publishes what the controller confirms.
///
/// Every state change is a command followed by the device's status query.
/// The command's own reply is logged and otherwise ignored: the displayed
/// status is always the query's answer, or `Unknown` when there is none.
pub struct ControlService<D> {
    device: D,
    cache: ReadingCache,
}

impl<D: DeviceApi> ControlService<D> {
    pub fn new(device: D, cache: ReadingCache) -> Self {
        Self { device, cache }
    }

    /// Switch `device` on (or off) and return the status it reports afterwards.
    pub async fn set(&self, device: Device, on: bool) -> DeviceStatus {
        let command = device.command(on);
        match self.device.call(command, &[]).await {
            Ok(ack) => info!(device = %device, on, ack = %ack.trim(), "Command acknowledged"),
            Err(e) => warn!(device = %device, on, error = %e, "Command failed"),
        }

        self.refresh(device).await
    }

    /// Query `device` without changing it and publish the result.
    pub async fn refresh(&self, device: Device) -> DeviceStatus {
        let status = self
            .query_status(device.status_query(), device.vocabulary())
            .await;
        info!(device = %device, status = %status, "Device status confirmed");
        self.cache.set_status(device, status.to_string()).await;
        status
    }

    /// Refresh every device one after another.
    pub async fn refresh_all(&self) -> Vec<(Device, DeviceStatus)> {
        let mut statuses = Vec::with_capacity(Device::ALL.len());
        for device in Device::ALL {
            statuses.push((device, self.refresh(device).await));
        }
        statuses
    }

    /// Whether the fan is physically running, as opposed to requested on.
    pub async fn fan_running(&self) -> DeviceStatus {
        self.query_status(Endpoint::FanStatus, StatusVocabulary::Switch)
            .await
    }

    /// Open or close the door.
    ///
    /// Only the exact expected state is accepted; anything else, including
    /// the other valid state, becomes the action's failure message. The
    /// match ignores case and surrounding whitespace, since the controller
    /// ends its replies with a newline.
    pub async fn set_door(&self, action: DoorAction) -> String {
        match self.device.call(action.command(), &[]).await {
            Ok(ack) => info!(action = ?action, ack = %ack.trim(), "Door command acknowledged"),
            Err(e) => warn!(action = ?action, error = %e, "Door command failed"),
        }

        let expected = action.expected_status();
        let shown = match self.device.call(Endpoint::DoorStatus, &[]).await {
            Ok(raw) if raw.trim().eq_ignore_ascii_case(expected) => expected.to_uppercase(),
            Ok(raw) => {
                warn!(action = ?action, status = %raw.trim(), "Door did not reach expected state");
                action.failure_message().to_owned()
            }
            Err(e) => {
                warn!(action = ?action, error = %e, "Door status query failed");
                action.failure_message().to_owned()
            }
        };

        self.cache.set_door(shown.clone()).await;
        shown
    }

    /// Current door state without moving it.
    pub async fn door_status(&self) -> String {
        let shown = match self.device.call(Endpoint::DoorStatus, &[]).await {
            Ok(raw) => match DeviceStatus::parse(&raw, StatusVocabulary::Cover) {
                DeviceStatus::Unknown => DOOR_STATUS_FAILED.to_owned(),
                status => status.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "Door status query failed");
                DOOR_STATUS_FAILED.to_owned()
            }
        };

        self.cache.set_door(shown.clone()).await;
        shown
    }

    /// Ask the controller to start voice capture. The reply is informational.
    pub async fn start_record(&self) -> Option<String> {
        match self.device.call(Endpoint::StartRecord, &[]).await {
            Ok(reply) => {
                info!(reply = %reply.trim(), "Voice record started");
                Some(reply)
            }
            Err(e) => {
                warn!(error = %e, "Voice record request failed");
                None
            }
        }
    }

    async fn query_status(&self, query: Endpoint, vocabulary: StatusVocabulary) -> DeviceStatus {
        match self.device.call(query, &[]).await {
            Ok(raw) => {
                let status = DeviceStatus::parse(&raw, vocabulary);
                if status == DeviceStatus::Unknown {
                    warn!(query = ?query, raw = %raw.trim(), "Unrecognised status reply");
                }
                status
            }
            Err(e) => {
                warn!(query = ?query, error = %e, "Status query failed");
                DeviceStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{fake::FakeDevice, models::Room};

    fn service(fake: FakeDevice) -> (Arc<FakeDevice>, ReadingCache, ControlService<Arc<FakeDevice>>) {
        let fake = Arc::new(fake);
        let cache = ReadingCache::new();
        let service = ControlService::new(fake.clone(), cache.clone());
        (fake, cache, service)
    }

    #[tokio::test]
    async fn status_comes_from_query_not_command() {
        let kitchen = Device::Light(Room::Kitchen);
        let (fake, cache, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::LightOn(Room::Kitchen), "ON")
                // The relay did not latch.
                .reply(Endpoint::LightStatus(Room::Kitchen), "off"),
        );

        assert_eq!(svc.set(kitchen, true).await, DeviceStatus::Off);
        assert_eq!(cache.status(kitchen).await, "OFF");
        assert_eq!(
            fake.calls(),
            vec![
                Endpoint::LightOn(Room::Kitchen),
                Endpoint::LightStatus(Room::Kitchen)
            ]
        );
    }

    #[tokio::test]
    async fn failed_query_is_unknown_even_if_command_succeeded() {
        let (_, cache, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::CurtainOpen, "opened")
                .fail(Endpoint::CurtainStatus, 500),
        );

        assert_eq!(svc.set(Device::Curtain, true).await, DeviceStatus::Unknown);
        assert_eq!(cache.status(Device::Curtain).await, "Unknown");
    }

    #[tokio::test]
    async fn failed_command_still_queries() {
        let (fake, _, svc) = service(
            FakeDevice::new()
                .fail(Endpoint::FanOn, 503)
                .reply(Endpoint::FanTurnedOnByUser, "on"),
        );

        assert_eq!(svc.set(Device::Fan, true).await, DeviceStatus::On);
        assert_eq!(fake.count(Endpoint::FanTurnedOnByUser), 1);
    }

    #[tokio::test]
    async fn unrecognised_reply_is_unknown() {
        let (_, cache, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::MotionDrivenOn, "ok")
                .reply(Endpoint::MotionDrivenStatus, "maybe"),
        );

        assert_eq!(svc.set(Device::MotionMode, true).await, DeviceStatus::Unknown);
        assert_eq!(cache.status(Device::MotionMode).await, "Unknown");
    }

    #[tokio::test]
    async fn surveillance_uses_activity_words() {
        let (_, _, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::SurveillanceDisable, "ok")
                .reply(Endpoint::SurveillanceStatus, "inactive"),
        );

        assert_eq!(svc.set(Device::Surveillance, false).await, DeviceStatus::Off);
    }

    #[tokio::test]
    async fn door_reply_whitespace_is_ignored_but_words_are_not() {
        let (_, _, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::DoorStatus, " closed\r\n")
                .reply(Endpoint::DoorStatus, "closed!"),
        );

        assert_eq!(svc.set_door(DoorAction::Close).await, "CLOSED");
        assert_eq!(svc.set_door(DoorAction::Close).await, "Failed to close door");
    }

    #[tokio::test]
    async fn door_open_confirmed() {
        let (fake, cache, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::DoorOpen, "opening")
                .reply(Endpoint::DoorStatus, "Open"),
        );

        assert_eq!(svc.set_door(DoorAction::Open).await, "OPEN");
        assert_eq!(cache.door().await, "OPEN");
        assert_eq!(fake.calls(), vec![Endpoint::DoorOpen, Endpoint::DoorStatus]);
    }

    #[tokio::test]
    async fn door_wrong_state_is_failure_message_not_unknown() {
        let (_, _, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::DoorOpen, "ok")
                .reply(Endpoint::DoorStatus, "closed"),
        );

        assert_eq!(svc.set_door(DoorAction::Open).await, "Failed to open door");
    }

    #[tokio::test]
    async fn door_close_failure_when_query_fails() {
        let (_, cache, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::DoorClose, "closed")
                .fail(Endpoint::DoorStatus, 500),
        );

        assert_eq!(svc.set_door(DoorAction::Close).await, "Failed to close door");
        assert_eq!(cache.door().await, "Failed to close door");
    }

    #[tokio::test]
    async fn door_status_without_command() {
        let (_, _, svc) = service(
            FakeDevice::new()
                .reply(Endpoint::DoorStatus, "CLOSED")
                .reply(Endpoint::DoorStatus, "jammed"),
        );

        assert_eq!(svc.door_status().await, "CLOSED");
        assert_eq!(svc.door_status().await, DOOR_STATUS_FAILED);
    }

    #[tokio::test]
    async fn refresh_all_covers_every_device() {
        let (fake, cache, svc) = service(
            FakeDevice::new()
                .always(Endpoint::LightStatus(Room::Bedroom), "on")
                .always(Endpoint::CurtainStatus, "closed"),
        );

        let statuses = svc.refresh_all().await;

        assert_eq!(statuses.len(), Device::ALL.len());
        assert_eq!(fake.calls().len(), Device::ALL.len());
        assert_eq!(cache.status(Device::Light(Room::Bedroom)).await, "ON");
        assert_eq!(cache.status(Device::Curtain).await, "CLOSED");
        assert_eq!(cache.status(Device::Fan).await, "Unknown");
    }

    #[tokio::test]
    async fn fan_running_reads_physical_state() {
        let (fake, _, svc) = service(FakeDevice::new().reply(Endpoint::FanStatus, "ON"));

        assert_eq!(svc.fan_running().await, DeviceStatus::On);
        assert_eq!(fake.calls(), vec![Endpoint::FanStatus]);
    }

    #[tokio::test]
    async fn start_record_swallows_failure() {
        let (_, _, svc) = service(FakeDevice::new().fail(Endpoint::StartRecord, 500));
        assert_eq!(svc.start_record().await, None);
    }
}
