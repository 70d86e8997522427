mod client;
pub mod types;

pub use client::{Client, DEFAULT_CONTEXT_ID, STREAM_URL, connect};
