use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// What to fetch for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Url(String),
    TitleYear { title: String, year: String },
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Url(url) => f.write_str(url),
            Identifier::TitleYear { title, year } => write!(f, "{} ({})", title, year),
        }
    }
}

/// Structured content handed to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Page(String),
    Lookup(Value),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {identifier} failed: {source}")]
    Transport {
        identifier: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{identifier} answered with HTTP {status}")]
    Status {
        identifier: String,
        status: StatusCode,
    },
    #[error("{identifier} returned a body that is not JSON: {source}")]
    Decode {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no lookup API key configured, cannot look up {identifier}")]
    MissingApiKey { identifier: String },
}

/// One outbound request per call, no retries.
pub trait Fetcher {
    async fn fetch(&self, id: &Identifier) -> Result<Content, FetchError>;
}

/// Lookup API endpoint and its static key.
#[derive(Debug, Clone)]
pub struct LookupApi {
    pub base_url: String,
    pub api_key: String,
}

pub struct HttpFetcher {
    client: reqwest::Client,
    lookup: Option<LookupApi>,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        lookup: Option<LookupApi>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(HttpFetcher { client, lookup })
    }

    async fn fetch_page(&self, id: &Identifier, url: &str) -> Result<Content, FetchError> {
        let transport = |source| FetchError::Transport {
            identifier: id.to_string(),
            source,
        };

        debug!("GET {}", url);
        let resp = self.client.get(url).send().await.map_err(transport)?;
        check_status(id, resp.status())?;
        let body = resp.text().await.map_err(transport)?;
        Ok(Content::Page(body))
    }

    async fn fetch_lookup(
        &self,
        id: &Identifier,
        title: &str,
        year: &str,
    ) -> Result<Content, FetchError> {
        let api = self.lookup.as_ref().ok_or_else(|| FetchError::MissingApiKey {
            identifier: id.to_string(),
        })?;
        // reqwest errors carry the URL, which holds the key.
        let transport = |source: reqwest::Error| FetchError::Transport {
            identifier: id.to_string(),
            source: source.without_url(),
        };

        debug!(title, year, "lookup query");
        let resp = self
            .client
            .get(&api.base_url)
            .query(&[("apikey", api.api_key.as_str()), ("t", title), ("y", year)])
            .send()
            .await
            .map_err(transport)?;
        check_status(id, resp.status())?;
        let text = resp.text().await.map_err(transport)?;
        let json = serde_json::from_str(&text).map_err(|source| FetchError::Decode {
            identifier: id.to_string(),
            source,
        })?;
        Ok(Content::Lookup(json))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, id: &Identifier) -> Result<Content, FetchError> {
        match id {
            Identifier::Url(url) => self.fetch_page(id, url).await,
            Identifier::TitleYear { title, year } => self.fetch_lookup(id, title, year).await,
        }
    }
}

fn check_status(id: &Identifier, status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Status {
            identifier: id.to_string(),
            status,
        })
    }
}
