//! A [`Fetcher`] that replays canned responses, for tests.

use super::{FetchResponse, Fetcher};
use crate::FetchError;
use core::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, LINK};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(FetchResponse),
    Fail(u16),
}

/// Answers each URL with a scripted response; unscripted URLs get a 404.
///
/// Every request is recorded so tests can assert on what was (not) fetched.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: HashMap<String, Scripted>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: impl Into<String>, data: Value) -> Self {
        let _ = self.responses.insert(url.into(), Scripted::Respond(FetchResponse::from_data(data)));
        self
    }

    pub fn respond_with_link(mut self, url: impl Into<String>, data: Value, link: &str) -> Self {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(LINK, HeaderValue::from_str(link).unwrap());
        let _ = self.responses.insert(url.into(), Scripted::Respond(FetchResponse::new(data, headers)));
        self
    }

    pub fn fail(mut self, url: impl Into<String>, status: u16) -> Self {
        let _ = self.responses.insert(url.into(), Scripted::Fail(status));
        self
    }

    /// Hold back the answer to `url` for `delay`.
    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        let _ = self.delays.insert(url.into(), delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn answer(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(url.to_string());

        match self.responses.get(url) {
            Some(Scripted::Respond(response)) => Ok(response.clone()),
            Some(Scripted::Fail(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send {
        let delay = self.delays.get(url).copied();
        let answer = self.answer(url);
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            answer
        }
    }
}
