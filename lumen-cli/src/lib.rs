//! # lumen-cli — headless Lumen host
//!
//! Loads a TOML configuration, drives a [`StreamRouter`](lumen_core::StreamRouter)
//! against the in-process loopback engine and reports through `tracing`.

pub mod config;
pub mod loopback;
pub mod sink;
