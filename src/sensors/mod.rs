mod service;

pub use service::{PollerState, SensorPoller, SensorService};
