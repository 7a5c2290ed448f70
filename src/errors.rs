//! Error types you might see while installing or using a sandbox root

use crate::storage::ContentDigest;
use std::{io, path::PathBuf};
use thiserror::Error;
use url::Url;

/// Errors while preparing a sandbox root: architecture detection,
/// downloads, local storage and archive extraction
#[derive(Error, Debug)]
pub enum SetupError {
    /// this machine's CPU architecture has no prebuilt engine or base image
    #[error("unsupported CPU architecture: {0:?}")]
    UnsupportedArchitecture(String),

    /// a source URL could not be parsed
    #[error("invalid source URL {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),

    /// source URL uses a scheme we can't download from
    #[error("unsupported URL scheme in {0}")]
    UnsupportedScheme(Url),

    /// every download attempt failed
    #[error("download of {url} failed after {attempts} attempts: {source}")]
    DownloadFailure {
        url: Url,
        attempts: u32,
        #[source]
        source: Box<SetupError>,
    },

    /// the server answered, but with an empty payload
    #[error("downloaded payload from {0} is empty")]
    EmptyDownload(Url),

    /// we are in offline mode, but a download was requested
    #[error("we are in offline mode, but a download of {0} was requested")]
    DownloadInOfflineMode(Url),

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of {url} is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        url: Url,
        expected: ContentDigest,
        found: ContentDigest,
    },

    /// string is not a valid content digest
    #[error("invalid content digest: {0:?}")]
    InvalidDigest(String),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// storage io error
    #[error("storage io error: {0}")]
    Storage(#[from] io::Error),

    /// install record could not be encoded or decoded
    #[error("install record error: {0}")]
    JSON(#[from] serde_json::Error),

    /// can't determine where to cache downloaded files
    #[error("can't determine where to cache downloaded files")]
    NoDefaultCacheDir,

    /// base filesystem archive could not be unpacked
    #[error("archive extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Errors from unpacking the base filesystem archive
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// the archive file could not be opened
    #[error("can't open archive {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// corrupt, truncated, or not a gzip-compressed tar stream
    #[error("corrupt, truncated or unrecognized archive: {0}")]
    Format(#[source] io::Error),

    /// the archive decoded fine but had nothing in it
    #[error("archive contains no entries")]
    Empty,

    /// one entry could not be written into the destination
    #[error("can't unpack archive entry {path:?}: {source}")]
    Entry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that occur while running commands in a sandbox root
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// the installed flag is missing, run install() first
    #[error("sandbox root at {0:?} is not installed")]
    SandboxNotInstalled(PathBuf),

    /// the sandboxed command exited unsuccessfully
    ///
    /// Processes killed by a signal report `128 + signal`, like a shell.
    #[error("command exited with status {exit_code}\n{stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// an argument vector command had no arguments at all
    #[error("no command to run")]
    EmptyCommand,

    /// the sandbox engine could not be started
    #[error("can't launch sandbox engine {engine:?}: {source}")]
    Launch {
        engine: PathBuf,
        #[source]
        source: io::Error,
    },

    /// io error
    #[error("io error: {0}")]
    IOError(#[from] io::Error),

    /// implicit install failed
    #[error("sandbox setup error: {0}")]
    Setup(#[from] SetupError),
}
