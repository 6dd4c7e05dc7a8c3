use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::domain::command::{
    AppendCommand, Command, CommandPayload, ReadAtCommand, ReadCommand, StreamData,
};
use crate::domain::kvs::{
    EventStoreError, KeyValueStore, StoreTx, BUCKET_CONTENT, BUCKET_INDEX,
};
use crate::domain::stream::Stream;

/// The domain engine. Stateless between calls; every state transition is an
/// (index version, content record) pair advanced by successful appends only.
pub struct Service {
    kvs: Arc<dyn KeyValueStore>,
}

impl Service {
    pub fn new(kvs: Arc<dyn KeyValueStore>) -> Self {
        Self { kvs }
    }

    /// Dispatches mutating commands. Subscriptions are accepted but not yet
    /// delivered; anything else that is not an append is rejected.
    pub fn handle(&self, cmd: Command) -> Result<(), EventStoreError> {
        let kind = cmd.kind();
        match cmd.payload {
            CommandPayload::Append(append) => self.append(append),
            CommandPayload::Subscribe(_) | CommandPayload::SubscribeWithOffset(_) => Ok(()),
            _ => Err(EventStoreError::UnknownCommand(kind)),
        }
    }

    /// Dispatches read-only commands.
    pub fn query(&self, cmd: Command) -> Result<Vec<Stream>, EventStoreError> {
        let kind = cmd.kind();
        match cmd.payload {
            CommandPayload::Read(read) => self.read(read),
            CommandPayload::ReadAt(read_at) => self.read_at(read_at),
            _ => Err(EventStoreError::UnknownCommand(kind)),
        }
    }

    /// Runs the whole batch inside one transaction: a failure on any entry
    /// aborts every entry, and the store is rolled back untouched.
    fn append(&self, cmd: AppendCommand) -> Result<(), EventStoreError> {
        let result = self.kvs.with_tx(&mut |tx| {
            for stream_data in &cmd.stream_data {
                Self::append_one(tx, stream_data)?;
            }
            Ok(())
        });
        if let Err(err) = result {
            self.kvs.rollback();
            return Err(err);
        }
        Ok(())
    }

    fn append_one(tx: &mut dyn StoreTx, data: &StreamData) -> Result<(), EventStoreError> {
        let current = match tx.get(BUCKET_INDEX, &data.name) {
            Ok(raw) => decode_version(&raw)?,
            // Absent index with expected version 0 means a new stream.
            Err(EventStoreError::KeyNotFound { .. }) if data.expected_version == 0 => 0,
            Err(err) => {
                error!(stream = %data.name, %err, "append - read index failed");
                return Err(EventStoreError::StorageReadFailed(err.to_string()));
            }
        };

        if current != data.expected_version {
            error!(
                stream = %data.name,
                actual = current,
                expected = data.expected_version,
                "append - concurrent write mismatch index"
            );
            return Err(EventStoreError::ConcurrentWriteConflict {
                expected: data.expected_version,
                actual: current,
            });
        }

        let stream = if data.expected_version == 0 {
            Stream::from_initial_events(&data.name, data.events.clone())
        } else {
            Self::next_append(tx, data)?
        };

        debug!(stream = %stream.name(), version = stream.version(), "append - entries");
        let raw = stream.to_bytes()?;
        trace!(raw = %String::from_utf8_lossy(&raw), "append - raw stream");

        tx.put(BUCKET_CONTENT, stream.name(), &raw)?;
        tx.put(BUCKET_INDEX, stream.name(), &stream.version().to_be_bytes())?;
        Ok(())
    }

    fn next_append(tx: &mut dyn StoreTx, data: &StreamData) -> Result<Stream, EventStoreError> {
        let raw = tx.get(BUCKET_CONTENT, &data.name)?;
        let mut stream = Stream::from_bytes(&raw)?;
        trace!(current = %String::from_utf8_lossy(&raw), "append - current stream");
        stream.extend(data.events.clone());
        Ok(stream)
    }

    fn read(&self, cmd: ReadCommand) -> Result<Vec<Stream>, EventStoreError> {
        let mut result = Vec::with_capacity(cmd.streams.len());
        for name in &cmd.streams {
            let raw = self.kvs.get(BUCKET_CONTENT, name)?;
            result.push(Stream::from_bytes(&raw)?);
        }
        Ok(result)
    }

    fn read_at(&self, cmd: ReadAtCommand) -> Result<Vec<Stream>, EventStoreError> {
        let mut result = Vec::with_capacity(cmd.streams.len());
        for name in &cmd.streams {
            let raw = self.kvs.get(BUCKET_CONTENT, name)?;
            let mut stream = Stream::from_bytes(&raw)?;
            stream.retain_until(cmd.at);
            result.push(stream);
        }
        Ok(result)
    }
}

fn decode_version(raw: &[u8]) -> Result<u64, EventStoreError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| EventStoreError::Storage(format!("index value has {} bytes, want 8", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::domain::command::{
        CommandContext, CommandKind, SubscribeCommand, SubscribeWithIdCommand,
        SubscribeWithOffsetCommand,
    };
    use crate::domain::event::Event;
    use crate::storage::memory::MemoryStore;

    fn ts(nanos: u32) -> DateTime<Utc> {
        DateTime::from_timestamp(1_726_091_499, nanos).expect("valid timestamp")
    }

    fn event(id: &str, at: DateTime<Utc>) -> Event {
        Event::new_at(id, format!("event-{id}"), "agg-1", at, Some(vec![0xca, 0xfe]))
    }

    fn setup() -> (Service, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(&[BUCKET_INDEX, BUCKET_CONTENT]));
        (Service::new(store.clone()), store)
    }

    fn append_cmd(stream_data: Vec<StreamData>) -> Command {
        Command::new(
            CommandContext::new(),
            CommandPayload::Append(AppendCommand::new(stream_data)),
        )
    }

    fn read_cmd(streams: &[&str]) -> Command {
        Command::new(
            CommandContext::new(),
            CommandPayload::Read(ReadCommand::new(
                streams.iter().map(ToString::to_string).collect(),
            )),
        )
    }

    fn read_at_cmd(at: DateTime<Utc>, streams: &[&str]) -> Command {
        Command::new(
            CommandContext::new(),
            CommandPayload::ReadAt(ReadAtCommand::new(
                at,
                streams.iter().map(ToString::to_string).collect(),
            )),
        )
    }

    #[test]
    fn fresh_append_sorts_by_occurred_at() {
        let (service, _) = setup();

        // e1 occurs after e2; input order must not matter.
        let data = StreamData::new(
            "orders-1",
            0,
            vec![event("e1", ts(200)), event("e2", ts(100))],
        );
        service.handle(append_cmd(vec![data])).expect("append");

        let streams = service.query(read_cmd(&["orders-1"])).expect("read");
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].version(), 2);
        assert_eq!(streams[0].events()[&0].id(), "e2");
        assert_eq!(streams[0].events()[&1].id(), "e1");
    }

    #[test]
    fn incremental_append_extends_in_input_order() {
        let (service, _) = setup();

        let first = StreamData::new(
            "orders-1",
            0,
            vec![event("e1", ts(200)), event("e2", ts(100))],
        );
        service.handle(append_cmd(vec![first])).expect("append");

        // Deliberately out of timestamp order; input order must win now.
        let second = StreamData::new(
            "orders-1",
            2,
            vec![event("e4", ts(400)), event("e3", ts(300))],
        );
        service.handle(append_cmd(vec![second])).expect("append");

        let streams = service.query(read_cmd(&["orders-1"])).expect("read");
        assert_eq!(streams[0].version(), 4);
        assert_eq!(streams[0].events()[&2].id(), "e4");
        assert_eq!(streams[0].events()[&3].id(), "e3");
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let (service, store) = setup();

        let first = StreamData::new(
            "orders-1",
            0,
            vec![event("e1", ts(100)), event("e2", ts(200)), event("e3", ts(300))],
        );
        service.handle(append_cmd(vec![first])).expect("append");

        let stale = StreamData::new("orders-1", 1, vec![event("e4", ts(400))]);
        let err = service.handle(append_cmd(vec![stale])).unwrap_err();
        match err {
            EventStoreError::ConcurrentWriteConflict { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 3);
            }
            other => panic!("expected ConcurrentWriteConflict, got {other:?}"),
        }

        // Stored version and content are untouched.
        let idx = store.get(BUCKET_INDEX, "orders-1").expect("index");
        assert_eq!(idx, 3u64.to_be_bytes());
        let streams = service.query(read_cmd(&["orders-1"])).expect("read");
        assert_eq!(streams[0].version(), 3);
    }

    #[test]
    fn missing_index_with_nonzero_expected_version_fails() {
        let (service, _) = setup();

        let data = StreamData::new("ghost", 2, vec![event("e1", ts(100))]);
        let err = service.handle(append_cmd(vec![data])).unwrap_err();
        assert!(matches!(err, EventStoreError::StorageReadFailed(_)));
    }

    #[test]
    fn failed_batch_leaves_no_partial_writes() {
        let (service, store) = setup();

        let good = StreamData::new("orders-1", 0, vec![event("e1", ts(100))]);
        // Stale version on a stream that does not exist yet.
        let bad = StreamData::new("orders-2", 7, vec![event("e2", ts(200))]);
        let err = service.handle(append_cmd(vec![good, bad])).unwrap_err();
        assert!(matches!(err, EventStoreError::StorageReadFailed(_)));

        // The first entry must not have landed either.
        assert!(matches!(
            store.get(BUCKET_INDEX, "orders-1"),
            Err(EventStoreError::KeyNotFound { .. })
        ));
        assert!(matches!(
            store.get(BUCKET_CONTENT, "orders-1"),
            Err(EventStoreError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn read_missing_stream_propagates_key_not_found() {
        let (service, _) = setup();

        let err = service.query(read_cmd(&["nope"])).unwrap_err();
        assert!(matches!(err, EventStoreError::KeyNotFound { .. }));
    }

    #[test]
    fn read_rejects_corrupt_content() {
        let (service, store) = setup();

        let corrupt = serde_json::json!({
            "Name": "orders-1",
            "Version": 2,
            "Events": {
                "0": serde_json::to_value(event("e1", ts(100))).expect("event"),
            },
        });
        store
            .put(BUCKET_CONTENT, "orders-1", corrupt.to_string().as_bytes())
            .expect("put");

        let err = service.query(read_cmd(&["orders-1"])).unwrap_err();
        assert!(matches!(err, EventStoreError::CorruptStream { .. }));
    }

    #[test]
    fn read_at_filters_by_cutoff_and_keeps_positions() {
        let (service, _) = setup();

        let data = StreamData::new(
            "orders-1",
            0,
            vec![event("e1", ts(100)), event("e2", ts(200)), event("e3", ts(300))],
        );
        service.handle(append_cmd(vec![data])).expect("append");

        // Cutoff between e2 and e3; the filter is occurred_at <= cutoff.
        let streams = service
            .query(read_at_cmd(ts(250), &["orders-1"]))
            .expect("read_at");
        let events = streams[0].events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[&0].id(), "e1");
        assert_eq!(events[&1].id(), "e2");
        assert!(!events.contains_key(&2));
    }

    #[test]
    fn read_at_includes_events_exactly_at_cutoff() {
        let (service, _) = setup();

        let data = StreamData::new(
            "orders-1",
            0,
            vec![event("e1", ts(100)), event("e2", ts(200))],
        );
        service.handle(append_cmd(vec![data])).expect("append");

        let streams = service
            .query(read_at_cmd(ts(200), &["orders-1"]))
            .expect("read_at");
        assert_eq!(streams[0].events().len(), 2);
    }

    #[test]
    fn subscriptions_are_accepted_as_noop() {
        let (service, _) = setup();

        let subscribe = Command::new(
            CommandContext::new(),
            CommandPayload::Subscribe(SubscribeCommand::new(vec!["orders-1".into()])),
        );
        service.handle(subscribe).expect("subscribe");

        let with_offset = Command::new(
            CommandContext::new(),
            CommandPayload::SubscribeWithOffset(SubscribeWithOffsetCommand::new(
                42,
                vec!["orders-1".into()],
            )),
        );
        service.handle(with_offset).expect("subscribe with offset");
    }

    #[test]
    fn mismatched_dispatch_is_an_unknown_command() {
        let (service, _) = setup();

        let err = service.handle(read_cmd(&["orders-1"])).unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::UnknownCommand(CommandKind::Read)
        ));

        let with_id = Command::new(
            CommandContext::new(),
            CommandPayload::SubscribeWithId(SubscribeWithIdCommand::new(
                "sub-1",
                vec!["orders-1".into()],
            )),
        );
        let err = service.handle(with_id).unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::UnknownCommand(CommandKind::SubscribeWithId)
        ));

        let append = append_cmd(vec![]);
        let err = service.query(append).unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::UnknownCommand(CommandKind::Append)
        ));
    }

    #[test]
    fn reappending_at_version_zero_replaces_nothing_silently() {
        let (service, _) = setup();

        let first = StreamData::new("orders-1", 0, vec![event("e1", ts(100))]);
        service.handle(append_cmd(vec![first])).expect("append");

        // A second writer that still believes the stream is new conflicts.
        let second = StreamData::new("orders-1", 0, vec![event("e2", ts(200))]);
        let err = service.handle(append_cmd(vec![second])).unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::ConcurrentWriteConflict {
                expected: 0,
                actual: 1
            }
        ));
    }
}
