pub mod log;

pub mod config;
pub mod error;
pub mod flow;
pub mod guard;
pub mod invalidate;
pub mod keys;
pub mod migration;
pub mod report;
pub mod routes;
pub mod step_result;
pub mod storage;
pub mod store;
pub mod types;
