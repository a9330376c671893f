//! CrowdGuard SOS access layer: emergency report capture and persistence.
//!
//! Records a bounded-duration video into a blob, uploads it, writes SOS
//! alert documents, appends analysis/notification logs, streams
//! location-scoped broadcast alerts and drives the danger-banner state.
//! Persistence goes through the [`store::DocumentStore`] trait so the
//! Postgres adapter and the in-memory fake are interchangeable.

pub mod banner;
pub mod clients;
pub mod config;
pub mod fallback;
pub mod media;
pub mod models;
pub mod store;
