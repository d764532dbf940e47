//! Parley real-time chat server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod gateway;
pub mod presence;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod ws;

#[cfg(test)]
mod test_support;
