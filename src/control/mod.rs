mod service;

pub use service::{ControlService, DOOR_STATUS_FAILED};
