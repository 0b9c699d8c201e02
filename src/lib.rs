pub mod bot;
pub mod bots;
pub mod commands;
pub mod config;
pub mod discord;
pub mod fsio;
pub mod manifest;
pub mod metrics;
pub mod platform;
pub mod router;
pub mod selection;
pub mod settings;
pub mod status;
pub mod updater;
pub mod version_source;
