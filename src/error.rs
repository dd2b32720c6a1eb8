//! Error taxonomy shared by the reconciliation engine.

use std::path::PathBuf;
use thiserror::Error;

/// A raw string that does not normalize to a usable domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid domain: {raw:?}")]
pub struct InvalidDomainError {
    pub raw: String,
}

/// Retrieval of a provider block-list failed.
#[derive(Debug, Error)]
pub enum ProviderFetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading body of {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{url} is unavailable: {reason}")]
    Unavailable { url: String, reason: String },
}

/// The allow-list could not be read. Fatal for the router's cycle.
#[derive(Debug, Error)]
#[error("failed to read allow-list {path}: {source}")]
pub struct AllowListReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The file listing provider URLs could not be read.
#[derive(Debug, Error)]
#[error("failed to read source list {path}: {source}")]
pub struct SourceListReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A persisted cache entry exists but cannot be used.
#[derive(Debug, Error)]
pub enum CacheCorruptionError {
    #[error("cache file {path} is unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure talking to a router. Never retried within a cycle.
#[derive(Debug, Error)]
pub enum RouterApiError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("login rejected: {0}")]
    Login(String),

    #[error("command {command} failed: {message}")]
    Trap { command: String, message: String },

    #[error("router closed the session: {0}")]
    Fatal(String),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Anything that aborts a single router's reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    AllowList(#[from] AllowListReadError),

    #[error(transparent)]
    SourceList(#[from] SourceListReadError),

    #[error(transparent)]
    Router(#[from] RouterApiError),

    #[error("reconciliation aborted: {0}")]
    Aborted(String),
}
