//! Concurrent capture, alerting and tiling for multiple EVE Online clients
//!
//! A [`pipeline::TrackingSession`] runs one capture task per window through
//! the [`scheduler`], keeps the newest frame of each in the lock-free
//! [`cache`], and feeds frames to the [`alert`] detector. The [`layout`]
//! module computes tiling geometry independently of capture.

#![forbid(unsafe_code)]

pub mod alert;
pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ipc;
pub mod layout;
pub mod pipeline;
pub mod scheduler;
pub mod snapshot;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
