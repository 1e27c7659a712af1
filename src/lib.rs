pub mod app;
pub mod backend;
pub mod category;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod models;
pub mod notify;
pub mod reports;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
