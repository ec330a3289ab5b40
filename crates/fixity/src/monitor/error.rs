//! Error types for the monitor pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Monitor error type
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Filesystem event queue overflowed; notifications were lost")]
    EventOverflow,

    #[error("Root directory is not accessible: {0}")]
    RootUnreadable(PathBuf),

    #[error("Source file removed before checksum completed: {0}")]
    SourceRemoved(PathBuf),

    #[error("Digest error for {path}: {message}")]
    Digest { path: PathBuf, message: String },

    #[error("Checksum work failed for {path}: {source}")]
    Work {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MonitorError>;
