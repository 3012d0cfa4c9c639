mod service;

pub use service::{EnrollmentState, RfidEnrollment, RfidError, ScanOutcome};
