use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable domain event. Created once, never mutated.
///
/// The serde field names pin the persisted JSON profile of the content
/// bucket; `occurred_at` round-trips as RFC 3339 with nanosecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "AggregateID")]
    aggregate_id: String,
    #[serde(rename = "OccurredAt")]
    occurred_at: DateTime<Utc>,
    #[serde(rename = "Payload", default, skip_serializing_if = "Option::is_none")]
    payload: Option<Vec<u8>>,
}

impl Event {
    pub fn new_at(
        id: impl Into<String>,
        name: impl Into<String>,
        aggregate_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aggregate_id: aggregate_id.into(),
            occurred_at,
            payload,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}
