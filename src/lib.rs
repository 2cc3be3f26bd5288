// Library exports for mailsieve crate
// This allows tests and the binary to use the modules

pub mod actions;
pub mod config;
pub mod database;
pub mod email;
pub mod gateway;
pub mod gmail_client;
pub mod ingest;
pub mod processor;
pub mod rules;
pub mod store;
