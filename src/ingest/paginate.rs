// src/ingest/paginate.rs
//! Offset-based pagination over a [`PageFetcher`].
//!
//! [`Paginator`] is a lazy, single-pass record sequence: it fetches a page only
//! when the previous one has been fully consumed, so at most one page is held
//! in memory and nothing is fetched ahead of the consumer.

use metrics::counter;
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::IngestError;
use crate::ingest::types::{PageFetcher, PageRequest, Record, RecordSource};

/// What to fetch and how fast. Borrowed by the paginator for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    pub indicator: String,
    pub page_size: usize,
    /// Global row cap across all pages. `Some(0)` yields nothing.
    pub max_rows: Option<usize>,
    pub select: Option<String>,
    pub filter: Option<String>,
    /// Pause between pages. Pacing only.
    pub page_delay: Duration,
}

impl PaginationConfig {
    pub fn new(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            page_size: 1000,
            max_rows: None,
            select: None,
            filter: None,
            page_delay: Duration::ZERO,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_select(mut self, select: Option<String>) -> Self {
        self.select = select;
        self
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.indicator.trim().is_empty() {
            return Err(IngestError::Config("indicator must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(IngestError::Config("page size must be > 0".into()));
        }
        Ok(())
    }
}

pub struct Paginator<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    cfg: &'a PaginationConfig,
    fetched: usize,
    cursor: usize,
    pages: usize,
    buffer: VecDeque<Record>,
    done: bool,
}

impl<'a, F: PageFetcher + ?Sized> Paginator<'a, F> {
    pub fn new(fetcher: &'a F, cfg: &'a PaginationConfig) -> Result<Self, IngestError> {
        cfg.validate()?;
        Ok(Self {
            fetcher,
            cfg,
            fetched: 0,
            cursor: 0,
            pages: 0,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    /// Offset the next fetch will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Records received from the API so far (not necessarily consumed yet).
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Fetch calls issued so far, including the terminating empty one.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Size to request next, or `None` once the row cap is used up.
    fn next_request_size(&self) -> Option<usize> {
        match self.cfg.max_rows {
            Some(cap) => {
                let remaining = cap.saturating_sub(self.fetched);
                (remaining > 0).then(|| self.cfg.page_size.min(remaining))
            }
            None => Some(self.cfg.page_size),
        }
    }

    /// Pulls the next page into the buffer. Returns false at end-of-data.
    async fn refill(&mut self) -> Result<bool, IngestError> {
        let Some(size) = self.next_request_size() else {
            tracing::debug!(indicator = %self.cfg.indicator, fetched = self.fetched, "row cap reached");
            return Ok(false);
        };

        if self.pages > 0 && !self.cfg.page_delay.is_zero() {
            tokio::time::sleep(self.cfg.page_delay).await;
        }

        let cfg = self.cfg;
        let req = PageRequest {
            indicator: &cfg.indicator,
            offset: self.cursor,
            size,
            select: cfg.select.as_deref(),
            filter: cfg.filter.as_deref(),
        };
        self.pages += 1;
        let mut page = self.fetcher.fetch_page(&req).await?;
        counter!("ingest_pages_total").increment(1);

        if page.is_empty() {
            tracing::debug!(indicator = %self.cfg.indicator, cursor = self.cursor, "empty page, end of data");
            return Ok(false);
        }

        // The cap holds even if the API over-delivers.
        if self.cfg.max_rows.is_some() {
            page.records.truncate(size);
        }

        let n = page.len();
        self.fetched += n;
        self.cursor += n;
        counter!("ingest_records_total").increment(n as u64);
        self.buffer.extend(page.records);
        Ok(true)
    }

    /// Next record in API delivery order, or `Ok(None)` when exhausted.
    /// After an error or the end of data the sequence stays finished.
    pub async fn next_record(&mut self) -> Result<Option<Record>, IngestError> {
        loop {
            if let Some(r) = self.buffer.pop_front() {
                return Ok(Some(r));
            }
            if self.done {
                return Ok(None);
            }
            match self.refill().await {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<'a, F: PageFetcher + ?Sized> RecordSource for Paginator<'a, F> {
    async fn next_record(&mut self) -> Result<Option<Record>, IngestError> {
        Paginator::next_record(self).await
    }
}
