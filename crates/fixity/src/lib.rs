//! Fixity - Checksum Sidecar Monitor
//!
//! Fixity watches a directory hierarchy for instrument data files and keeps an
//! up-to-date checksum sidecar (`<file>.md5`) next to each of them. Discovery
//! is dual-sourced: a realtime filesystem watcher for low latency and a
//! periodic full-tree sweep for completeness.

pub mod monitor;
