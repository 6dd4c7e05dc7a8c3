use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub db_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(2006);

        let backend = match env::var("BACKEND").as_deref() {
            Ok("rocksdb") => Backend::Rocksdb,
            Ok("memory") | Err(_) => Backend::Memory,
            Ok(other) => return Err(format!("unknown BACKEND: {other}")),
        };

        // Configurable DB path for running several nodes locally.
        let db_path = env::var("DB_PATH").unwrap_or_else(|_| "data/eventvault".to_string());

        Ok(Self {
            port,
            backend,
            db_path,
        })
    }
}
