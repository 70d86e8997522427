mod client;
mod config;
pub mod types;

pub use client::{Client, connect};
pub use config::{Config, ConfigBuilder};
