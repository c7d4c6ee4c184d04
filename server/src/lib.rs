pub extern crate actix_web;

pub mod admin;
pub mod auth;
pub mod config;
pub mod connection;
mod connection_tx_storage;
pub mod handlers;
pub mod room;
pub mod server;
pub mod server_state;
pub mod snapshot_store;
pub mod turn;
