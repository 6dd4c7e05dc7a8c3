pub mod memory;
pub mod rocksdb;
