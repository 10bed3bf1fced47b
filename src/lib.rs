//! rssagg - An RSS feed registry API
//!
//! This crate provides a small JSON HTTP API for registering users, adding
//! feeds, and following or unfollowing them, backed by SQLite.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
