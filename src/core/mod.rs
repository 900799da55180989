pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod invoker;
pub mod lifecycle;
pub mod store;
pub mod terminal;
pub mod tracker;
