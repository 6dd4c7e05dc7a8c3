use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use tonic::Status;

use crate::api;
use crate::domain::event::Event;
use crate::domain::stream::Stream;

pub fn api_to_domain(events: Vec<api::Event>) -> Result<Vec<Event>, Status> {
    events
        .into_iter()
        .map(|e| {
            let occurred_at = required_timestamp(e.occurred_at)?;
            // An empty wire payload means no payload.
            let payload = if e.payload.is_empty() {
                None
            } else {
                Some(e.payload)
            };
            Ok(Event::new_at(e.id, e.name, e.aggregate_id, occurred_at, payload))
        })
        .collect()
}

pub fn required_timestamp(ts: Option<Timestamp>) -> Result<DateTime<Utc>, Status> {
    let ts = ts.ok_or_else(|| Status::invalid_argument("missing timestamp"))?;
    let nanos = u32::try_from(ts.nanos)
        .map_err(|_| Status::invalid_argument("negative timestamp nanos"))?;
    DateTime::from_timestamp(ts.seconds, nanos)
        .ok_or_else(|| Status::invalid_argument("timestamp out of range"))
}

pub fn datetime_to_timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Wire positions are 1-based; the wire version counts the events actually
/// carried, so point-in-time reads report the filtered count.
pub fn domain_to_api(stream: &Stream) -> api::Stream {
    let events = stream
        .events()
        .iter()
        .map(|(pos, e)| api::Event {
            id: e.id().to_string(),
            name: e.name().to_string(),
            aggregate_id: e.aggregate_id().to_string(),
            pos: pos + 1,
            payload: e.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            occurred_at: Some(datetime_to_timestamp(e.occurred_at())),
        })
        .collect();
    api::Stream {
        name: stream.name().to_string(),
        version: stream.events().len() as u64,
        events,
    }
}

pub fn domain_to_api_streams(streams: &[Stream]) -> api::Streams {
    api::Streams {
        streams: streams.iter().map(domain_to_api).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(nanos: u32) -> DateTime<Utc> {
        DateTime::from_timestamp(1_726_091_499, nanos).expect("valid timestamp")
    }

    #[test]
    fn wire_positions_are_one_based() {
        let stream = Stream::from_initial_events(
            "orders-1",
            vec![
                Event::new_at("e1", "event-1", "agg", ts(100), None),
                Event::new_at("e2", "event-2", "agg", ts(200), Some(vec![7])),
            ],
        );

        let wire = domain_to_api(&stream);
        assert_eq!(wire.name, "orders-1");
        assert_eq!(wire.version, 2);
        assert_eq!(wire.events[0].pos, 1);
        assert_eq!(wire.events[1].pos, 2);
        assert!(wire.events[0].payload.is_empty());
        assert_eq!(wire.events[1].payload, vec![7]);
    }

    #[test]
    fn timestamps_round_trip_with_nanos() {
        let at = ts(810_959_063);
        let back = required_timestamp(Some(datetime_to_timestamp(at))).expect("timestamp");
        assert_eq!(back, at);
    }

    #[test]
    fn missing_or_negative_timestamps_are_rejected() {
        assert!(required_timestamp(None).is_err());
        assert!(required_timestamp(Some(Timestamp {
            seconds: 0,
            nanos: -1,
        }))
        .is_err());
    }

    #[test]
    fn empty_payload_becomes_absent() {
        let wire = vec![api::Event {
            id: "e1".to_string(),
            name: "event-1".to_string(),
            aggregate_id: "agg".to_string(),
            pos: 0,
            payload: Vec::new(),
            occurred_at: Some(datetime_to_timestamp(ts(100))),
        }];

        let events = api_to_domain(wire).expect("translate");
        assert_eq!(events.len(), 1);
        assert!(events[0].payload().is_none());
    }
}
