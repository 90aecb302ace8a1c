// src/ingest/providers/gho.rs
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::IngestError;
use crate::ingest::types::{Page, PageFetcher, PageRequest, Record};

pub const GHO_BASE: &str = "https://ghoapi.azureedge.net/api";

const USER_AGENT: &str = concat!("who-gho-ingest/", env!("CARGO_PKG_VERSION"));

/// OData envelope. Anything besides `value` is ignored.
#[derive(Debug, Deserialize)]
struct ODataPage {
    value: Vec<Map<String, Value>>,
}

/// Page fetcher for the WHO Global Health Observatory OData API
/// (`$top`/`$skip` pagination). Never retries.
#[derive(Clone)]
pub struct GhoApiFetcher {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl GhoApiFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, IngestError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self, indicator: &str) -> String {
        format!("{}/{}", self.base_url, indicator)
    }

    /// Query pairs for one page, in the order the API documents them.
    pub fn query_params(req: &PageRequest<'_>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("$format", "json".to_string()),
            ("$top", req.size.to_string()),
            ("$skip", req.offset.to_string()),
        ];
        if let Some(sel) = req.select {
            params.push(("$select", sel.to_string()));
        }
        if let Some(f) = req.filter {
            params.push(("$filter", f.to_string()));
        }
        params
    }

    fn parse_page(offset: usize, body: &str) -> Result<Page, IngestError> {
        let parsed: ODataPage = serde_json::from_str(body).map_err(|e| {
            IngestError::Decode(format!("{e}; body starts with: {}", crate::error::excerpt(body)))
        })?;
        Ok(Page {
            offset,
            records: parsed.value.into_iter().map(Record).collect(),
        })
    }
}

#[async_trait]
impl PageFetcher for GhoApiFetcher {
    async fn fetch_page(&self, req: &PageRequest<'_>) -> Result<Page, IngestError> {
        let t0 = std::time::Instant::now();
        let url = self.endpoint(req.indicator);

        let resp = match self
            .client
            .get(&url)
            .query(&Self::query_params(req))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, indicator = req.indicator, offset = req.offset, "indicator API request failed");
                counter!("ingest_fetch_errors_total").increment(1);
                return Err(IngestError::Transport(e));
            }
        };

        let status = resp.status();
        let body = resp.text().await?;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if status != StatusCode::OK {
            counter!("ingest_fetch_errors_total").increment(1);
            return Err(IngestError::remote(status.as_u16(), &body));
        }

        let page = Self::parse_page(req.offset, &body)?;
        tracing::debug!(
            indicator = req.indicator,
            offset = req.offset,
            requested = req.size,
            rows = page.len(),
            "fetched page"
        );
        Ok(page)
    }

    fn name(&self) -> &'static str {
        "gho"
    }
}
