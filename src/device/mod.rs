pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod models;

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

use crate::config::Config;

pub use self::error::DeviceError;
use self::models::{Endpoint, OtpResponse, RfidRecord, SensorReading};

/// Operations against the home controller.
///
/// `call` is the only required method: one request, one attempt, success
/// only on HTTP 200. Everything else is layered on top of it, so services
/// can be handed a scripted stand-in instead of a live controller.
pub trait DeviceApi: Send + Sync {
    /// Issue `endpoint` once. GET endpoints send `params` as the query
    /// string, POST endpoints as a URL-encoded form.
    fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, DeviceError>> + Send;

    /// Full sensor snapshot.
    fn fetch_sensor_data(&self) -> impl Future<Output = Result<SensorReading, DeviceError>> + Send {
        async move {
            let body = self.call(Endpoint::SensorData, &[]).await?;
            SensorReading::from_json(&body)
        }
    }

    /// Ask the controller to email an OTP. `None` unless it reports one was sent.
    fn send_otp(&self, email: &str) -> impl Future<Output = Option<String>> + Send {
        async move {
            let body = match self.call(Endpoint::SendOtp, &[("email", email)]).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "OTP request failed");
                    return None;
                }
            };
            match serde_json::from_str::<OtpResponse>(&body) {
                Ok(resp) => resp.into_otp(),
                Err(e) => {
                    warn!(error = %e, "OTP response was not understood");
                    None
                }
            }
        }
    }

    fn add_rfid(
        &self,
        owner: &str,
        rfid: &str,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send {
        async move {
            self.call(Endpoint::AddRfid, &[("owner", owner), ("rfid", rfid)])
                .await
        }
    }

    fn add_user(
        &self,
        fullname: &str,
        username: &str,
        password: &str,
        email: &str,
    ) -> impl Future<Output = Result<String, DeviceError>> + Send {
        async move {
            self.call(
                Endpoint::AddUser,
                &[
                    ("fullname", fullname),
                    ("username", username),
                    ("password", password),
                    ("email", email),
                ],
            )
            .await
        }
    }

    fn all_rfids(&self) -> impl Future<Output = Result<Vec<RfidRecord>, DeviceError>> + Send {
        async move {
            let body = self.call(Endpoint::AllRfids, &[]).await?;
            Ok(RfidRecord::parse_list(&body))
        }
    }
}

impl<T: DeviceApi> DeviceApi for Arc<T> {
    fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, DeviceError>> + Send {
        (**self).call(endpoint, params)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;
        Ok(Self::with_client(http, &config.device_base_url))
    }

    /// Wrap an already configured `reqwest::Client`.
    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_owned(),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }
}

impl DeviceApi for DeviceClient {
    async fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<String, DeviceError> {
        let path = endpoint.path();
        let url = format!("{}{}", self.inner.base_url, path);
        let method = endpoint.method();
        debug!(method = %method, url = %url, "Calling controller");

        let request = if method == Method::POST {
            self.inner.http.post(&url).form(params)
        } else if params.is_empty() {
            self.inner.http.get(&url)
        } else {
            self.inner.http.get(&url).query(params)
        };

        let response = request
            .send()
            .await
            .map_err(|source| DeviceError::Transport {
                endpoint: path.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %path, status = status.as_u16(), body = %body, "Controller returned error status");
            return Err(DeviceError::Status {
                endpoint: path,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| DeviceError::Transport {
                endpoint: path.clone(),
                source,
            })?;

        debug!(endpoint = %path, body = %body, "Controller replied");
        Ok(body)
    }
}
