pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod metrics;
pub mod models;
pub mod openapi;
pub mod registry;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

#[cfg(test)]
pub mod test_support;
