use chrono::{DateTime, Utc};

use crate::domain::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Unknown,
    Append,
    Read,
    ReadAt,
    Subscribe,
    SubscribeWithId,
    SubscribeWithOffset,
}

/// Per-request context carried by every command. The deadline is advisory:
/// no algorithm observes it once a write has been staged.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    deadline: Option<DateTime<Utc>>,
}

impl CommandContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }
}

/// Envelope handed to the service, constructed per request by the
/// transport and consumed once.
#[derive(Debug)]
pub struct Command {
    pub ctx: CommandContext,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(ctx: CommandContext, payload: CommandPayload) -> Self {
        Self { ctx, payload }
    }

    pub fn kind(&self) -> CommandKind {
        match self.payload {
            CommandPayload::Append(_) => CommandKind::Append,
            CommandPayload::Read(_) => CommandKind::Read,
            CommandPayload::ReadAt(_) => CommandKind::ReadAt,
            CommandPayload::Subscribe(_) => CommandKind::Subscribe,
            CommandPayload::SubscribeWithId(_) => CommandKind::SubscribeWithId,
            CommandPayload::SubscribeWithOffset(_) => CommandKind::SubscribeWithOffset,
        }
    }
}

/// One strongly-typed payload per command kind.
#[derive(Debug)]
pub enum CommandPayload {
    Append(AppendCommand),
    Read(ReadCommand),
    ReadAt(ReadAtCommand),
    Subscribe(SubscribeCommand),
    SubscribeWithId(SubscribeWithIdCommand),
    SubscribeWithOffset(SubscribeWithOffsetCommand),
}

#[derive(Debug)]
pub struct AppendCommand {
    pub stream_data: Vec<StreamData>,
}

impl AppendCommand {
    pub fn new(stream_data: Vec<StreamData>) -> Self {
        Self { stream_data }
    }
}

/// One stream's worth of events to append, guarded by the version the
/// caller asserts the stream is at. Lives for the duration of one append.
#[derive(Debug)]
pub struct StreamData {
    pub name: String,
    pub expected_version: u64,
    pub events: Vec<Event>,
}

impl StreamData {
    pub fn new(name: impl Into<String>, expected_version: u64, events: Vec<Event>) -> Self {
        Self {
            name: name.into(),
            expected_version,
            events,
        }
    }
}

#[derive(Debug)]
pub struct ReadCommand {
    pub streams: Vec<String>,
}

impl ReadCommand {
    pub fn new(streams: Vec<String>) -> Self {
        Self { streams }
    }
}

#[derive(Debug)]
pub struct ReadAtCommand {
    pub at: DateTime<Utc>,
    pub streams: Vec<String>,
}

impl ReadAtCommand {
    pub fn new(at: DateTime<Utc>, streams: Vec<String>) -> Self {
        Self { at, streams }
    }
}

#[derive(Debug)]
pub struct SubscribeCommand {
    pub streams: Vec<String>,
}

impl SubscribeCommand {
    pub fn new(streams: Vec<String>) -> Self {
        Self { streams }
    }
}

#[derive(Debug)]
pub struct SubscribeWithIdCommand {
    pub subscription_id: String,
    pub streams: Vec<String>,
}

impl SubscribeWithIdCommand {
    pub fn new(subscription_id: impl Into<String>, streams: Vec<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            streams,
        }
    }
}

#[derive(Debug)]
pub struct SubscribeWithOffsetCommand {
    pub offset: u64,
    pub streams: Vec<String>,
}

impl SubscribeWithOffsetCommand {
    pub fn new(offset: u64, streams: Vec<String>) -> Self {
        Self { offset, streams }
    }
}
