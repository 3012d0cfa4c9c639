mod service;

pub use service::{AuthError, AuthService, PendingSignup, SignupDetails};
