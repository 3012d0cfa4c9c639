use thiserror::Error;
use tracing::{info, warn};

use crate::{
    device::{models::Endpoint, DeviceApi},
    session::{Session, SessionError, SessionManager},
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to connect to device")]
    DeviceUnreachable,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to send OTP")]
    OtpNotSent,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Failed to create user")]
    SignupFailed,

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct SignupDetails {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Signup waiting for the user to type in the emailed code.
#[derive(Debug, Clone)]
pub struct PendingSignup {
    details: SignupDetails,
    otp: String,
}

impl PendingSignup {
    pub fn details(&self) -> &SignupDetails {
        &self.details
    }
}

/// Credential checks against the controller, feeding `SessionManager`.
pub struct AuthService<D> {
    device: D,
    sessions: SessionManager,
}

impl<D: DeviceApi> AuthService<D> {
    pub fn new(device: D, sessions: SessionManager) -> Self {
        Self { device, sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Compare against the single account stored on the controller.
    /// The session is only written on an exact match.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let stored_username = self.device.call(Endpoint::GetUsername, &[]).await;
        let stored_password = self.device.call(Endpoint::GetPassword, &[]).await;

        let (stored_username, stored_password) = match (stored_username, stored_password) {
            (Ok(u), Ok(p)) => (u, p),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Could not read stored credentials");
                return Err(AuthError::DeviceUnreachable);
            }
        };

        if username != stored_username.trim() || password != stored_password.trim() {
            info!(username = %username, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.sessions.login(username, None).await?)
    }

    /// First signup step: have the controller email a one-time code.
    pub async fn request_otp(&self, details: SignupDetails) -> Result<PendingSignup, AuthError> {
        let Some(otp) = self.device.send_otp(&details.email).await else {
            return Err(AuthError::OtpNotSent);
        };
        info!(email = %details.email, "OTP sent");
        Ok(PendingSignup { details, otp })
    }

    /// Second signup step. A wrong code fails without contacting the controller.
    pub async fn complete_signup(
        &self,
        pending: &PendingSignup,
        otp: &str,
    ) -> Result<Session, AuthError> {
        if otp.trim() != pending.otp {
            return Err(AuthError::InvalidOtp);
        }

        let SignupDetails {
            fullname,
            username,
            email,
            password,
        } = &pending.details;

        if let Err(e) = self.device.add_user(fullname, username, password, email).await {
            warn!(username = %username, error = %e, "Controller refused new user");
            return Err(AuthError::SignupFailed);
        }

        info!(username = %username, "User created");
        Ok(self.sessions.signup(username, Some(fullname)).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::device::fake::FakeDevice;

    fn auth(fake: FakeDevice) -> (TempDir, Arc<FakeDevice>, AuthService<Arc<FakeDevice>>) {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(fake);
        let sessions = SessionManager::new(dir.path().join("session.json"));
        (dir, fake.clone(), AuthService::new(fake, sessions))
    }

    fn details() -> SignupDetails {
        SignupDetails {
            fullname: "Asha K".into(),
            username: "asha".into(),
            email: "asha@example.com".into(),
            password: "s3cret".into(),
        }
    }

    fn stored_account() -> FakeDevice {
        FakeDevice::new()
            .reply(Endpoint::GetUsername, "admin\n")
            .reply(Endpoint::GetPassword, "hunter2")
    }

    #[tokio::test]
    async fn correct_credentials_start_a_week_long_session() {
        let (_dir, _, auth) = auth(stored_account());

        let before = Utc::now();
        let session = auth.login("admin", "hunter2").await.unwrap();

        assert!(session.logged_in);
        let expected = (before + Duration::days(7)).timestamp_millis();
        assert!((session.expiry_ms - expected).abs() <= 1000);
        assert!(auth.sessions().is_logged_in().await);
    }

    #[tokio::test]
    async fn wrong_credentials_leave_session_untouched() {
        let (_dir, _, auth) = auth(stored_account());

        let err = auth.login("admin", "hunter3").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(
            auth.sessions().current().await.unwrap(),
            Session::default()
        );
    }

    #[tokio::test]
    async fn unreachable_device_is_distinct_from_bad_password() {
        let (_dir, _, auth) = auth(
            FakeDevice::new()
                .reply(Endpoint::GetUsername, "admin")
                .fail(Endpoint::GetPassword, 500),
        );

        assert!(matches!(
            auth.login("admin", "hunter2").await,
            Err(AuthError::DeviceUnreachable)
        ));
        assert!(!auth.sessions().is_logged_in().await);
    }

    #[tokio::test]
    async fn signup_with_matching_otp_creates_user_and_session() {
        let (_dir, fake, auth) = auth(
            FakeDevice::new()
                .reply(Endpoint::SendOtp, r#"{"otpSent":true,"otp":"4821"}"#)
                .reply(Endpoint::AddUser, "User added"),
        );

        let pending = auth.request_otp(details()).await.unwrap();
        let session = auth.complete_signup(&pending, " 4821 ").await.unwrap();

        assert_eq!(session.fullname.as_deref(), Some("Asha K"));
        assert_eq!(
            fake.params(Endpoint::SendOtp).unwrap(),
            vec![("email".to_owned(), "asha@example.com".to_owned())]
        );
        let form = fake.params(Endpoint::AddUser).unwrap();
        assert!(form.contains(&("username".to_owned(), "asha".to_owned())));
        assert!(form.contains(&("password".to_owned(), "s3cret".to_owned())));
    }

    #[tokio::test]
    async fn wrong_otp_never_reaches_device() {
        let (_dir, fake, auth) = auth(
            FakeDevice::new().reply(Endpoint::SendOtp, r#"{"otpSent":true,"otp":"4821"}"#),
        );

        let pending = auth.request_otp(details()).await.unwrap();
        assert!(matches!(
            auth.complete_signup(&pending, "0000").await,
            Err(AuthError::InvalidOtp)
        ));
        assert_eq!(fake.count(Endpoint::AddUser), 0);
        assert!(!auth.sessions().is_logged_in().await);
    }

    #[tokio::test]
    async fn otp_not_sent() {
        let (_dir, _, auth) = auth(
            FakeDevice::new().reply(Endpoint::SendOtp, r#"{"otpSent":false}"#),
        );

        assert!(matches!(
            auth.request_otp(details()).await,
            Err(AuthError::OtpNotSent)
        ));
    }

    #[tokio::test]
    async fn refused_user_creation_does_not_log_in() {
        let (_dir, _, auth) = auth(
            FakeDevice::new()
                .reply(Endpoint::SendOtp, r#"{"otpSent":true,"otp":"4821"}"#)
                .fail(Endpoint::AddUser, 409),
        );

        let pending = auth.request_otp(details()).await.unwrap();
        assert!(matches!(
            auth.complete_signup(&pending, "4821").await,
            Err(AuthError::SignupFailed)
        ));
        assert!(!auth.sessions().is_logged_in().await);
    }
}
