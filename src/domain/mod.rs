pub mod command;
pub mod event;
pub mod kvs;
pub mod service;
pub mod stream;
