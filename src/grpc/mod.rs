use std::sync::Arc;
use std::time::Instant;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::api::event_store_server::EventStore;
use crate::api::{
    AppendRequest, AppendResponse, Entry, ReadAtRequest, ReadRequest, Streams,
    SubscriptionRequest, SubscriptionWithIdRequest, SubscriptionWithOffsetRequest,
};
use crate::domain::command::{
    AppendCommand, Command, CommandContext, CommandPayload, ReadAtCommand, ReadCommand,
    StreamData,
};
use crate::domain::kvs::EventStoreError;
use crate::domain::service::Service;

pub mod translate;

/// Thin adapter between the wire and the domain: decodes requests into
/// commands, hands them to the service, encodes results back.
pub struct GrpcTransport {
    service: Arc<Service>,
}

impl GrpcTransport {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

fn status_from(err: EventStoreError) -> Status {
    match err {
        EventStoreError::ConcurrentWriteConflict { .. } => {
            Status::failed_precondition(err.to_string())
        }
        EventStoreError::KeyNotFound { .. } => Status::not_found(err.to_string()),
        EventStoreError::CorruptStream { .. } => Status::data_loss(err.to_string()),
        EventStoreError::UnknownCommand(_) => Status::invalid_argument(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl EventStore for GrpcTransport {
    type SubscribeStream = ReceiverStream<Result<Entry, Status>>;
    type SubscribeWithIdStream = ReceiverStream<Result<Entry, Status>>;
    type SubscribeWithOffsetStream = ReceiverStream<Result<Entry, Status>>;

    async fn append(
        &self,
        request: Request<AppendRequest>,
    ) -> Result<Response<AppendResponse>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let mut stream_data = Vec::with_capacity(req.stream_data.len());
        for data in req.stream_data {
            let events = translate::api_to_domain(data.events)?;
            stream_data.push(StreamData::new(data.name, data.expected_version, events));
        }
        let cmd = Command::new(
            CommandContext::new(),
            CommandPayload::Append(AppendCommand::new(stream_data)),
        );

        let result = self.service.handle(cmd);
        debug!(elapsed = ?start.elapsed(), "Append");
        result.map_err(status_from)?;
        Ok(Response::new(AppendResponse {}))
    }

    async fn read(&self, request: Request<ReadRequest>) -> Result<Response<Streams>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let cmd = Command::new(
            CommandContext::new(),
            CommandPayload::Read(ReadCommand::new(req.streams)),
        );
        let result = self.service.query(cmd);
        debug!(elapsed = ?start.elapsed(), "Read");
        let streams = result.map_err(status_from)?;
        Ok(Response::new(translate::domain_to_api_streams(&streams)))
    }

    async fn read_at(
        &self,
        request: Request<ReadAtRequest>,
    ) -> Result<Response<Streams>, Status> {
        let start = Instant::now();
        let req = request.into_inner();

        let at = translate::required_timestamp(req.at)?;
        let cmd = Command::new(
            CommandContext::new(),
            CommandPayload::ReadAt(ReadAtCommand::new(at, req.streams)),
        );
        let result = self.service.query(cmd);
        debug!(elapsed = ?start.elapsed(), "ReadAt");
        let streams = result.map_err(status_from)?;
        Ok(Response::new(translate::domain_to_api_streams(&streams)))
    }

    async fn subscribe(
        &self,
        _request: Request<SubscriptionRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        Err(Status::unimplemented("Subscribe is not implemented"))
    }

    async fn subscribe_with_id(
        &self,
        _request: Request<SubscriptionWithIdRequest>,
    ) -> Result<Response<Self::SubscribeWithIdStream>, Status> {
        Err(Status::unimplemented("SubscribeWithId is not implemented"))
    }

    async fn subscribe_with_offset(
        &self,
        _request: Request<SubscriptionWithOffsetRequest>,
    ) -> Result<Response<Self::SubscribeWithOffsetStream>, Status> {
        Err(Status::unimplemented(
            "SubscribeWithOffset is not implemented",
        ))
    }
}
