//! Podwatch agent: configuration and HTTP surface of the collector binary

pub mod api;
pub mod config;
