//! Scripted controller for service tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use tokio::time;

use super::{models::Endpoint, DeviceApi, DeviceError};

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Status(u16),
    /// Body returned only after the delay, like a slow controller.
    Delayed(Duration, String),
}

/// Replies are consumed in order per endpoint; once a queue is empty the
/// endpoint's `always` reply (or HTTP 404) is used.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    queued: Mutex<HashMap<Endpoint, VecDeque<Reply>>>,
    always: Mutex<HashMap<Endpoint, Reply>>,
    calls: Mutex<Vec<(Endpoint, Vec<(String, String)>)>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, endpoint: Endpoint, body: &str) -> Self {
        self.queue(endpoint, Reply::Body(body.to_owned()));
        self
    }

    pub fn reply_after(mut self, endpoint: Endpoint, delay: Duration, body: &str) -> Self {
        self.queue(endpoint, Reply::Delayed(delay, body.to_owned()));
        self
    }

    pub fn fail(mut self, endpoint: Endpoint, status: u16) -> Self {
        self.queue(endpoint, Reply::Status(status));
        self
    }

    pub fn always(mut self, endpoint: Endpoint, body: &str) -> Self {
        self.always
            .get_mut()
            .unwrap()
            .insert(endpoint, Reply::Body(body.to_owned()));
        self
    }

    fn queue(&mut self, endpoint: Endpoint, reply: Reply) {
        self.queued
            .get_mut()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// Endpoints called so far, in order.
    pub fn calls(&self) -> Vec<Endpoint> {
        self.calls.lock().unwrap().iter().map(|(e, _)| *e).collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls().into_iter().filter(|e| *e == endpoint).count()
    }

    /// Parameters of the most recent call to `endpoint`.
    pub fn params(&self, endpoint: Endpoint) -> Option<Vec<(String, String)>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| *e == endpoint)
            .map(|(_, p)| p.clone())
    }
}

impl DeviceApi for FakeDevice {
    async fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<String, DeviceError> {
        self.calls.lock().unwrap().push((
            endpoint,
            params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        ));

        let reply = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.always.lock().unwrap().get(&endpoint).cloned())
            .unwrap_or(Reply::Status(404));

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Delayed(delay, body) => {
                time::sleep(delay).await;
                Ok(body)
            }
            Reply::Status(status) => Err(DeviceError::Status {
                endpoint: endpoint.path(),
                status,
                body: String::new(),
            }),
        }
    }
}
