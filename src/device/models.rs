use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::Result;
use reqwest::Method;
use serde::Deserialize;

use super::error::DeviceError;

/// Placeholder the controller (and the display layer) use for "no value".
pub const EMPTY_SENTINEL: &str = "--";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Kitchen,
    Bedroom,
    LivingRoom,
}

impl Room {
    fn slug(self) -> &'static str {
        match self {
            Room::Kitchen => "kitchen",
            Room::Bedroom => "bedroom",
            Room::LivingRoom => "livingroom",
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Every HTTP operation the controller exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    SensorData,
    DoorOpen,
    DoorClose,
    DoorStatus,
    SurveillanceEnable,
    SurveillanceDisable,
    SurveillanceStatus,
    AllRfids,
    RfidScanFlag,
    AddRfid,
    LightOn(Room),
    LightOff(Room),
    LightStatus(Room),
    FanOn,
    FanOff,
    /// Whether the fan is physically spinning.
    FanStatus,
    /// Whether the user asked for the fan to be on.
    FanTurnedOnByUser,
    CurtainOpen,
    CurtainClose,
    CurtainStatus,
    MotionDrivenOn,
    MotionDrivenOff,
    MotionDrivenStatus,
    StartRecord,
    GetUsername,
    GetPassword,
    AddUser,
    SendOtp,
}

impl Endpoint {
    pub fn path(self) -> String {
        match self {
            Endpoint::SensorData => "/sensorData".to_owned(),
            Endpoint::DoorOpen => "/door/open".to_owned(),
            Endpoint::DoorClose => "/door/close".to_owned(),
            Endpoint::DoorStatus => "/door/status".to_owned(),
            Endpoint::SurveillanceEnable => "/surveillance/enable".to_owned(),
            Endpoint::SurveillanceDisable => "/surveillance/disable".to_owned(),
            Endpoint::SurveillanceStatus => "/surveillance/status".to_owned(),
            Endpoint::AllRfids => "/all-rfids".to_owned(),
            Endpoint::RfidScanFlag => "/rfid/scan-flag".to_owned(),
            Endpoint::AddRfid => "/add-rfid".to_owned(),
            Endpoint::LightOn(room) => format!("/light/{room}/on"),
            Endpoint::LightOff(room) => format!("/light/{room}/off"),
            Endpoint::LightStatus(room) => format!("/light/{room}/status"),
            Endpoint::FanOn => "/fan/on".to_owned(),
            Endpoint::FanOff => "/fan/off".to_owned(),
            Endpoint::FanStatus => "/fan/status".to_owned(),
            Endpoint::FanTurnedOnByUser => "/fan/is-turned-on-by-user".to_owned(),
            Endpoint::CurtainOpen => "/curtain/open".to_owned(),
            Endpoint::CurtainClose => "/curtain/close".to_owned(),
            Endpoint::CurtainStatus => "/curtain/status".to_owned(),
            Endpoint::MotionDrivenOn => "/light/livingroom/motion-driven".to_owned(),
            Endpoint::MotionDrivenOff => "/light/livingroom/no-motion-driven".to_owned(),
            Endpoint::MotionDrivenStatus => "/light/livingroom/is-motion-driven".to_owned(),
            Endpoint::StartRecord => "/start-record".to_owned(),
            Endpoint::GetUsername => "/get-username".to_owned(),
            Endpoint::GetPassword => "/get-password".to_owned(),
            Endpoint::AddUser => "/add-user".to_owned(),
            Endpoint::SendOtp => "/send-otp".to_owned(),
        }
    }

    /// Record-creating endpoints take a URL-encoded form; everything else is a
    /// plain GET (with query parameters where needed).
    pub fn method(self) -> Method {
        match self {
            Endpoint::AddRfid | Endpoint::AddUser => Method::POST,
            _ => Method::GET,
        }
    }
}

// ---------------------------------------------------------------------------
// Controllable devices
// ---------------------------------------------------------------------------

/// Words a device uses for its two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVocabulary {
    /// `on` / `off`
    Switch,
    /// `open` / `closed`
    Cover,
    /// `active` / `inactive`
    Activity,
}

/// Every device that follows the command-then-query toggle protocol.
///
/// The door is deliberately absent: its failure reporting differs and lives
/// in `ControlService::set_door`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Light(Room),
    Fan,
    Curtain,
    MotionMode,
    Surveillance,
}

impl Device {
    pub const ALL: [Device; 7] = [
        Device::Light(Room::Kitchen),
        Device::Light(Room::Bedroom),
        Device::Light(Room::LivingRoom),
        Device::Fan,
        Device::Curtain,
        Device::MotionMode,
        Device::Surveillance,
    ];

    /// Command that drives the device towards `on` (or off when `false`).
    pub fn command(self, on: bool) -> Endpoint {
        match (self, on) {
            (Device::Light(room), true) => Endpoint::LightOn(room),
            (Device::Light(room), false) => Endpoint::LightOff(room),
            (Device::Fan, true) => Endpoint::FanOn,
            (Device::Fan, false) => Endpoint::FanOff,
            (Device::Curtain, true) => Endpoint::CurtainOpen,
            (Device::Curtain, false) => Endpoint::CurtainClose,
            (Device::MotionMode, true) => Endpoint::MotionDrivenOn,
            (Device::MotionMode, false) => Endpoint::MotionDrivenOff,
            (Device::Surveillance, true) => Endpoint::SurveillanceEnable,
            (Device::Surveillance, false) => Endpoint::SurveillanceDisable,
        }
    }

    /// Query that reports the state the commands above change.
    pub fn status_query(self) -> Endpoint {
        match self {
            Device::Light(room) => Endpoint::LightStatus(room),
            Device::Fan => Endpoint::FanTurnedOnByUser,
            Device::Curtain => Endpoint::CurtainStatus,
            Device::MotionMode => Endpoint::MotionDrivenStatus,
            Device::Surveillance => Endpoint::SurveillanceStatus,
        }
    }

    pub fn vocabulary(self) -> StatusVocabulary {
        match self {
            Device::Curtain => StatusVocabulary::Cover,
            Device::Surveillance => StatusVocabulary::Activity,
            _ => StatusVocabulary::Switch,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Light(room) => write!(f, "{room}-light"),
            Device::Fan => f.write_str("fan"),
            Device::Curtain => f.write_str("curtain"),
            Device::MotionMode => f.write_str("motion-mode"),
            Device::Surveillance => f.write_str("surveillance"),
        }
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kitchen-light" => Ok(Self::Light(Room::Kitchen)),
            "bedroom-light" => Ok(Self::Light(Room::Bedroom)),
            "livingroom-light" => Ok(Self::Light(Room::LivingRoom)),
            "fan" => Ok(Self::Fan),
            "curtain" => Ok(Self::Curtain),
            "motion-mode" => Ok(Self::MotionMode),
            "surveillance" => Ok(Self::Surveillance),
            other => Err(anyhow::anyhow!("unknown device: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Normalised device state. Anything outside the device's vocabulary is
/// `Unknown`; a raw reply is never passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    On,
    Off,
    Open,
    Closed,
    Unknown,
}

impl DeviceStatus {
    pub fn parse(raw: &str, vocabulary: StatusVocabulary) -> Self {
        let raw = raw.trim();
        let is = |word: &str| raw.eq_ignore_ascii_case(word);
        match vocabulary {
            StatusVocabulary::Switch if is("on") => Self::On,
            StatusVocabulary::Switch if is("off") => Self::Off,
            StatusVocabulary::Cover if is("open") => Self::Open,
            StatusVocabulary::Cover if is("closed") => Self::Closed,
            StatusVocabulary::Activity if is("active") => Self::On,
            StatusVocabulary::Activity if is("inactive") => Self::Off,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Unknown => "Unknown",
        })
    }
}

/// Target for the door commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorAction {
    Open,
    Close,
}

impl DoorAction {
    pub fn command(self) -> Endpoint {
        match self {
            DoorAction::Open => Endpoint::DoorOpen,
            DoorAction::Close => Endpoint::DoorClose,
        }
    }

    /// Status word the door must report after this action succeeds.
    pub fn expected_status(self) -> &'static str {
        match self {
            DoorAction::Open => "open",
            DoorAction::Close => "closed",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            DoorAction::Open => "Failed to open door",
            DoorAction::Close => "Failed to close door",
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor snapshot
// ---------------------------------------------------------------------------

/// One `/sensorData` reply: sensor name → value, exactly as reported.
///
/// Replaced wholesale on every poll, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorReading(BTreeMap<String, String>);

impl SensorReading {
    /// Parse a flat JSON object. Scalar values are kept as their textual
    /// form; nested values or a non-object body reject the whole reply.
    pub fn from_json(body: &str) -> Result<Self, DeviceError> {
        let endpoint = Endpoint::SensorData.path();
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|source| DeviceError::Malformed {
                endpoint: endpoint.clone(),
                source,
            })?;

        let serde_json::Value::Object(object) = value else {
            return Err(DeviceError::Unexpected {
                endpoint,
                reason: "expected a JSON object".to_owned(),
            });
        };

        object
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(DeviceError::Unexpected {
                            endpoint: endpoint.clone(),
                            reason: format!("sensor {key:?} is not a scalar"),
                        })
                    }
                };
                Ok((key, text))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for display, `"--"` when absent.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).unwrap_or(EMPTY_SENTINEL)
    }

    /// Numeric gas level, `0.0` when absent or unparseable.
    pub fn level(&self, key: &str) -> f32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0)
    }

    pub fn temperature(&self) -> &str {
        self.text("temperature")
    }

    pub fn humidity(&self) -> &str {
        self.text("humidity")
    }

    /// Tag currently on the reader, if any.
    pub fn rfid(&self) -> Option<&str> {
        self.get("RFID")
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && *tag != EMPTY_SENTINEL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean of the `GAS_SENSORS` levels, absent ones counting as zero.
    pub fn air_quality_index(&self) -> f32 {
        let total: f32 = GAS_SENSORS.iter().map(|gas| self.level(gas)).sum();
        total / GAS_SENSORS.len() as f32
    }
}

/// Gas sensors shown on the dashboard, in display order.
pub const GAS_SENSORS: [&str; 5] = ["smoke", "LPG", "CO", "CO2", "NH3"];

/// Banding of `SensorReading::air_quality_index`. Each band's upper edge
/// is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AqiBand {
    /// Below 50.
    Good,
    /// 50 up to 100.
    Moderate,
    /// 100 up to 150.
    Poor,
    /// 150 up to 200.
    Unhealthy,
    Hazardous,
}

impl AqiBand {
    pub fn of(index: f32) -> Self {
        match index {
            i if i < 50.0 => Self::Good,
            i if i < 100.0 => Self::Moderate,
            i if i < 150.0 => Self::Poor,
            i if i < 200.0 => Self::Unhealthy,
            _ => Self::Hazardous,
        }
    }
}

impl fmt::Display for AqiBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
            Self::Unhealthy => "unhealthy",
            Self::Hazardous => "hazardous",
        })
    }
}

// ---------------------------------------------------------------------------
// RFID
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfidRecord {
    pub owner: String,
    pub tag_id: String,
}

impl RfidRecord {
    /// Parse the `/all-rfids` body: one `owner # tagId` record per line.
    /// Blank or malformed lines are skipped.
    pub fn parse_list(body: &str) -> Vec<Self> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('#').map(str::trim).collect();
                match parts.as_slice() {
                    [owner, tag_id] => Some(Self {
                        owner: (*owner).to_owned(),
                        tag_id: (*tag_id).to_owned(),
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// OTP
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OtpResponse {
    #[serde(rename = "otpSent")]
    pub otp_sent: bool,
    pub otp: Option<String>,
}

impl OtpResponse {
    pub fn into_otp(self) -> Option<String> {
        self.otp_sent.then_some(self.otp).flatten()
    }
}
