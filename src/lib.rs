//! feedcast - CQRS feed pipeline
//!
//! A write side that creates feeds and announces them as `created_feed`
//! events, an event bus that delivers those events to callback and stream
//! subscribers, and read sides that project them into a fuzzy search index
//! and a live websocket fan-out.

pub mod bus;
pub mod codec;
pub mod command;
pub mod config;
pub mod events;
pub mod http;
pub mod models;
pub mod projectors;
pub mod query;
pub mod repository;
pub mod search;
pub mod utils;
