pub mod access;
pub mod app;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod mail;
pub mod profiles;
pub mod query;
pub mod results;
pub mod state;
pub mod storage;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;
