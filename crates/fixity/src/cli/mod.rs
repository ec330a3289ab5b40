//! CLI module for Fixity.
//!
//! Command implementations live here; argument definitions live with the
//! clap derive structs in `main.rs`.

pub mod checksum;
