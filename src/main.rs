use std::sync::Arc;

use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eventvault::api::event_store_server::EventStoreServer;
use eventvault::config::settings::{Backend, Config};
use eventvault::domain::kvs::{KeyValueStore, BUCKET_CONTENT, BUCKET_INDEX};
use eventvault::domain::service::Service;
use eventvault::grpc::GrpcTransport;
use eventvault::storage::memory::MemoryStore;
use eventvault::storage::rocksdb::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(?config, "loaded config");

    let buckets = [BUCKET_INDEX, BUCKET_CONTENT];
    let kvs: Arc<dyn KeyValueStore> = match config.backend {
        Backend::Memory => Arc::new(MemoryStore::new(&buckets)),
        Backend::Rocksdb => Arc::new(RocksStore::new(&config.db_path, &buckets)?),
    };

    let service = Arc::new(Service::new(kvs));
    let transport = GrpcTransport::new(service);

    let addr = format!("0.0.0.0:{}", config.port).parse()?;
    info!(%addr, "server listening");

    Server::builder()
        .add_service(EventStoreServer::new(transport))
        .serve(addr)
        .await?;

    Ok(())
}
