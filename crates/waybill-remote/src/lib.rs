//! Client for the hosted backend that queued actions are replayed against.

mod client;

pub use client::{executor, BackendClient};
