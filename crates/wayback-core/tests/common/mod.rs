#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wayback_core::{Clock, Config, HttpResponse, Result, Sleeper, Transport};

/// A syntactically valid CDX line, unique per `n`.
pub fn record_line(n: u32) -> String {
    format!(
        "com,example)/page{n} 2020010100{n:04} https://example.com/page{n} text/html 200 \
         ABCDEFGHIJKLMNOPQRSTUVWXYZ234567 {}",
        1000 + n
    )
}

/// Config with every endpoint pointed at `base` and fast transport retries.
pub fn config_for(base: &str) -> Config {
    let mut config = Config::default();
    config.endpoints.archive_base = "https://web.archive.org".to_string();
    config.endpoints.cdx = format!("{base}/cdx/search/cdx");
    config.endpoints.save = format!("{base}/save");
    config.client.user_agent = "wayback-tests/1.0".to_string();
    config.transport.backoff_base_ms = 1;
    config.transport.backoff_max_ms = 5;
    config
}

/// Replays canned responses in order, repeating the last one forever.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    last: Mutex<Option<HttpResponse>>,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), user_agent.to_string()));

        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(response) = next {
            *last = Some(response);
        }
        Ok(last.clone().expect("scripted transport needs at least one response"))
    }
}

/// Records requested sleeps instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn seconds(&self) -> Vec<u64> {
        self.sleeps.lock().unwrap().iter().map(Duration::as_secs).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn response(status: u16, url: &str, headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status,
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        body: String::new(),
    }
}
