//! Core domain + application logic for the warden group-moderation bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / storage / the
//! AI backend live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dedupe;
pub mod detectors;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod moderation;
pub mod ports;
pub mod processor;
pub mod service;

#[cfg(test)]
pub(crate) mod testkit;

pub use errors::{Error, Result};
