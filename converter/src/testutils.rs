use crate::errors::FetchError;
use crate::fetch::{Fetcher, ForwardedHeaders};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

pub const TEMPLATE_URL: &str = "https://templates.example/base.yaml";

pub const TEMPLATE: &str = r#"
mixed-port: 7890
allow-lan: false
mode: rule
proxy-providers:
  airport:
    type: http
    url: https://airport.example/sub
    path: ./providers/airport.yaml
proxies:
  - {name: "🇭🇰 HK-01", type: ss, server: hk.old, port: 8388, cipher: aes-256-gcm, password: h}
  - {name: "🇯🇵 JP-01", type: ss, server: jp.old, port: 8388, cipher: aes-256-gcm, password: j}
proxy-groups:
  - name: "🚀 Select"
    type: select
    proxies: ["♻️ Auto", "🇭🇰 HK-01", "🇯🇵 JP-01", DIRECT]
  - name: "♻️ Auto"
    type: url-test
    use: [airport]
    proxies: ["🇭🇰 HK-01"]
    url: http://www.gstatic.com/generate_204
    interval: 300
rules:
  - DOMAIN-SUFFIX,local,DIRECT
  - MATCH,🚀 Select
"#;

type Respond = Box<dyn Fn() -> Result<String, FetchError> + Send + Sync>;

/// Serves canned documents by URL and records every request it sees.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Respond>,
    requests: Mutex<Vec<(String, ForwardedHeaders)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        let body = body.to_string();
        self.responses
            .insert(url.to_string(), Box::new(move || Ok(body.clone())));
        self
    }

    pub fn with_error(mut self, url: &str, error: fn() -> FetchError) -> Self {
        self.responses
            .insert(url.to_string(), Box::new(move || Err(error())));
        self
    }

    pub fn requests(&self) -> Vec<(String, ForwardedHeaders)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url, headers: &ForwardedHeaders) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));

        match self.responses.get(url.as_str()) {
            Some(respond) => respond(),
            None => Err(FetchError::Status(http::StatusCode::NOT_FOUND)),
        }
    }
}
