// src/ingest/types.rs
use serde_json::{Map, Value};

use crate::error::IngestError;

/// Field the API uses as a per-row identifier.
pub const ID_FIELD: &str = "Id";

/// One entity instance exactly as the API returned it. No schema is assumed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Correlation key for warehouse rows. Never used for deduplication.
    pub fn correlation_id(&self) -> Option<String> {
        match self.0.get(ID_FIELD)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Compact JSON text, byte-for-byte what lands in the raw file.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(m: Map<String, Value>) -> Self {
        Record(m)
    }
}

/// Records returned by one fetch, with the offset that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub offset: usize,
    pub records: Vec<Record>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parameters of a single page request. `select` and `filter` go to the API
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub indicator: &'a str,
    pub offset: usize,
    pub size: usize,
    pub select: Option<&'a str>,
    pub filter: Option<&'a str>,
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page. An empty page means end-of-data.
    async fn fetch_page(&self, req: &PageRequest<'_>) -> Result<Page, IngestError>;
    fn name(&self) -> &'static str;
}

/// Single-pass pull interface the sinks consume.
#[async_trait::async_trait]
pub trait RecordSource: Send {
    /// `Ok(None)` once the sequence is exhausted, and forever after.
    async fn next_record(&mut self) -> Result<Option<Record>, IngestError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(m) => Record(m),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn correlation_id_accepts_strings_and_numbers() {
        assert_eq!(
            rec(json!({"Id": "abc", "x": 1})).correlation_id().as_deref(),
            Some("abc")
        );
        assert_eq!(
            rec(json!({"Id": 27716870})).correlation_id().as_deref(),
            Some("27716870")
        );
        assert_eq!(rec(json!({"Id": null})).correlation_id(), None);
        assert_eq!(rec(json!({"id": "lowercase"})).correlation_id(), None);
        assert_eq!(
            rec(json!({"Id": [1, 2]})).correlation_id().as_deref(),
            Some("[1,2]")
        );
    }

    #[test]
    fn json_keeps_field_order_and_precision() {
        let line = r#"{"Zeta":1,"Alpha":0.1000000000000000055511151231257827,"Big":123456789012345678901234567890}"#;
        let r: Record = serde_json::from_str(line).unwrap();
        assert_eq!(r.to_json().unwrap(), line);
    }
}
