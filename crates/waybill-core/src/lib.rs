pub mod action;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod executor;
pub mod io;
pub mod paths;
pub mod queue;
pub mod status;
pub mod store;

pub use error::{BackendError, Result, WaybillError};
