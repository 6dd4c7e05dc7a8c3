use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::Event;
use crate::domain::kvs::EventStoreError;

/// The append-only, versioned event log for one aggregate, identified by
/// name. Positions form a dense sequence starting at 0; `version` always
/// equals the number of stored events.
///
/// Serializes to the content-bucket record: a JSON object with `Name`,
/// `Version` and `Events` (string-encoded position -> event record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Version")]
    version: u64,
    #[serde(rename = "Events")]
    events: BTreeMap<u64, Event>,
}

impl Stream {
    /// Returns a new and empty stream in version 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            events: BTreeMap::new(),
        }
    }

    /// Builds a fresh stream from the first batch of events: sorted by
    /// `occurred_at` ascending (ties keep input order), positions `0..n-1`.
    pub(crate) fn from_initial_events(name: &str, mut events: Vec<Event>) -> Self {
        events.sort_by_key(Event::occurred_at);
        let events: BTreeMap<u64, Event> = events
            .into_iter()
            .enumerate()
            .map(|(pos, event)| (pos as u64, event))
            .collect();
        Self {
            name: name.to_string(),
            version: events.len() as u64,
            events,
        }
    }

    /// Appends `events` in input order at positions `version..` and advances
    /// the version by their count.
    pub(crate) fn extend(&mut self, events: Vec<Event>) {
        let count = events.len() as u64;
        for (offset, event) in events.into_iter().enumerate() {
            self.events.insert(self.version + offset as u64, event);
        }
        self.version += count;
    }

    /// Drops every event strictly after `at`, keeping the position keys of
    /// the survivors (gaps are expected and not re-compacted).
    pub(crate) fn retain_until(&mut self, at: DateTime<Utc>) {
        self.events.retain(|_, event| event.occurred_at() <= at);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn events(&self) -> &BTreeMap<u64, Event> {
        &self.events
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EventStoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a content-bucket record, rejecting it when the declared
    /// version does not match the number of events it carries.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, EventStoreError> {
        let stream: Self = serde_json::from_slice(raw)?;
        stream.check_integrity()?;
        Ok(stream)
    }

    pub fn check_integrity(&self) -> Result<(), EventStoreError> {
        if self.events.len() as u64 != self.version {
            return Err(EventStoreError::CorruptStream {
                stream: self.name.clone(),
                version: self.version,
                events: self.events.len(),
            });
        }
        Ok(())
    }
}
