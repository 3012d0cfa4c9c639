use std::{future, time::Duration};

use thiserror::Error;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{
    models::{Endpoint, RfidRecord},
    DeviceApi, DeviceError,
};

#[derive(Debug, Error)]
pub enum RfidError {
    /// Rejected locally; nothing was sent.
    #[error("Please enter a name and scan RFID")]
    Validation,

    /// The controller did not accept the record. Carries its reply text.
    #[error("{0}")]
    Submit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentState {
    Idle,
    Scanning,
    GotTag(String),
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Tag(String),
    Cancelled,
    TimedOut,
}

/// Enrolment of a new RFID card: wait for a card on the reader, then
/// register it under an owner name.
pub struct RfidEnrollment<D> {
    device: D,
    interval: Duration,
    timeout: Option<Duration>,
    state: EnrollmentState,
}

impl<D: DeviceApi> RfidEnrollment<D> {
    /// `timeout` of `None` scans until cancelled.
    pub fn new(device: D, interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            device,
            interval,
            timeout,
            state: EnrollmentState::Idle,
        }
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    /// Scanned tag awaiting confirmation.
    pub fn tag(&self) -> Option<&str> {
        match &self.state {
            EnrollmentState::GotTag(tag) => Some(tag),
            _ => None,
        }
    }

    /// Poll the reader until a tag shows up, `cancel` fires, or the timeout
    /// elapses. Scanning again discards any previously scanned tag. If the
    /// returned future is dropped before it finishes, the state goes back
    /// to `Idle`.
    pub async fn scan(&mut self, cancel: &CancellationToken) -> ScanOutcome {
        let Self {
            device,
            interval,
            timeout,
            state,
        } = self;
        let device = &*device;
        let interval = *interval;
        let limit = *timeout;

        *state = EnrollmentState::Scanning;
        let guard = ScanGuard(state);
        info!(interval = ?interval, timeout = ?limit, "RFID scan started");

        let wait_for_tag = async {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                if let Some(tag) = scan_once(device).await {
                    info!(attempt, tag = %tag, "RFID tag scanned");
                    return tag;
                }
                debug!(attempt, "No RFID tag yet");
                time::sleep(interval).await;
            }
        };

        let deadline = async {
            match limit {
                Some(limit) => time::sleep(limit).await,
                None => future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => ScanOutcome::Cancelled,
            () = deadline => ScanOutcome::TimedOut,
            tag = wait_for_tag => ScanOutcome::Tag(tag),
        };

        *guard.0 = match &outcome {
            ScanOutcome::Tag(tag) => EnrollmentState::GotTag(tag.clone()),
            ScanOutcome::Cancelled | ScanOutcome::TimedOut => {
                warn!(outcome = ?outcome, "RFID scan ended without a tag");
                EnrollmentState::Idle
            }
        };
        outcome
    }

    /// Register the scanned tag under `owner` (trimmed, upper-cased) and
    /// return the controller's reply. Either way the form is cleared.
    pub async fn confirm(&mut self, owner: &str) -> Result<String, RfidError> {
        let owner = owner.trim();
        let tag = match &self.state {
            EnrollmentState::GotTag(tag) if !owner.is_empty() => tag.trim().to_owned(),
            _ => return Err(RfidError::Validation),
        };

        self.state = EnrollmentState::Submitting;
        let owner = owner.to_uppercase();
        let result = self.device.add_rfid(&owner, &tag).await;
        self.state = EnrollmentState::Idle;

        match result {
            Ok(reply) => {
                info!(owner = %owner, tag = %tag, reply = %reply.trim(), "RFID enrolled");
                Ok(reply)
            }
            Err(e) => {
                warn!(owner = %owner, tag = %tag, error = %e, "RFID enrolment failed");
                let message = e.server_message().unwrap_or("No response").to_owned();
                Err(RfidError::Submit(message))
            }
        }
    }

    /// Abandon the enrolment form.
    pub fn dismiss(&mut self) {
        self.state = EnrollmentState::Idle;
    }

    pub async fn list(&self) -> Result<Vec<RfidRecord>, DeviceError> {
        self.device.all_rfids().await
    }
}

/// Puts an unfinished scan back to `Idle` when the scan future is dropped.
struct ScanGuard<'a>(&'a mut EnrollmentState);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if *self.0 == EnrollmentState::Scanning {
            debug!("RFID scan abandoned");
            *self.0 = EnrollmentState::Idle;
        }
    }
}

/// Arm the reader, then look for a tag in the sensor snapshot.
async fn scan_once<D: DeviceApi>(device: &D) -> Option<String> {
    if let Err(e) = device.call(Endpoint::RfidScanFlag, &[]).await {
        warn!(error = %e, "Failed to arm RFID reader");
    }

    match device.fetch_sensor_data().await {
        Ok(reading) => reading.rfid().map(str::to_owned),
        Err(e) => {
            warn!(error = %e, "RFID scan poll failed");
            None
        }
    }
}
