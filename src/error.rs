//! Error types for the pipeline runtime.
//!
//! Hand-rolled enums with manual `Display`/`Error` impls, matching
//! `plugin_host::types::PluginError`'s style rather than pulling in
//! `thiserror`: one enum per concern, `From<std::io::Error>` where a
//! construction path touches the filesystem.

use std::fmt;
use std::path::PathBuf;

/// Failure constructing a single stage or an entire pipeline (spec §4.1, §7).
#[derive(Debug)]
pub enum ConstructionError {
    /// Stage name not present in the registry.
    UnknownStage(String),
    /// Wrong argument count; carries the stage's usage string.
    Usage { stage: String, usage: String },
    /// An argument parsed but was out of the valid range.
    InvalidArgument { stage: String, message: String },
    /// Allocation or other resource failure during construction.
    Resource { stage: String, message: String },
    /// The description string itself did not parse.
    MalformedDescription(String),
    /// A stage's prelude exceeds the pipeline's configured block size.
    PreludeExceedsBlockSize {
        stage: String,
        prelude: u32,
        block_size: u32,
    },
    /// Dynamic-library specific failure, wrapped.
    Dl(DlError),
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::UnknownStage(name) => write!(f, "unknown stage: {name}"),
            ConstructionError::Usage { stage, usage } => {
                write!(f, "{stage}: wrong argument count; usage: {usage}")
            }
            ConstructionError::InvalidArgument { stage, message } => {
                write!(f, "{stage}: invalid argument: {message}")
            }
            ConstructionError::Resource { stage, message } => {
                write!(f, "{stage}: resource error: {message}")
            }
            ConstructionError::MalformedDescription(desc) => {
                write!(f, "malformed pipeline description: {desc:?}")
            }
            ConstructionError::PreludeExceedsBlockSize {
                stage,
                prelude,
                block_size,
            } => write!(
                f,
                "{stage}: prelude {prelude} exceeds configured block size {block_size}"
            ),
            ConstructionError::Dl(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConstructionError {}

impl From<DlError> for ConstructionError {
    fn from(e: DlError) -> Self {
        ConstructionError::Dl(e)
    }
}

/// Failures specific to the `dl` stage's load/copy/watch protocol (spec §4.3).
#[derive(Debug)]
pub enum DlError {
    CopyFailed { from: PathBuf, message: String },
    LoadFailed { path: PathBuf, message: String },
    SymbolNotFound { symbol: String, message: String },
    WatchFailed { dir: PathBuf, message: String },
    InnerConstructionFailed(String),
    /// The hotswapped library's inner stage advertises a different prelude
    /// than the one fixed at construction (spec §4.3, §9 Open Question).
    PreludeMismatch { original: u32, replacement: u32 },
    Io(std::io::Error),
}

impl fmt::Display for DlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DlError::CopyFailed { from, message } => {
                write!(f, "failed to copy library {}: {message}", from.display())
            }
            DlError::LoadFailed { path, message } => {
                write!(f, "failed to load library {}: {message}", path.display())
            }
            DlError::SymbolNotFound { symbol, message } => {
                write!(f, "symbol {symbol:?} not found: {message}")
            }
            DlError::WatchFailed { dir, message } => {
                write!(f, "failed to watch {}: {message}", dir.display())
            }
            DlError::InnerConstructionFailed(message) => {
                write!(f, "inner stage construction failed: {message}")
            }
            DlError::PreludeMismatch {
                original,
                replacement,
            } => write!(
                f,
                "hotswapped library changed prelude from {original} to {replacement}; rejecting"
            ),
            DlError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for DlError {}

impl From<std::io::Error> for DlError {
    fn from(e: std::io::Error) -> Self {
        DlError::Io(e)
    }
}

/// A failure during the realtime `pass`/`process` path. Per spec §7 this is
/// fatal: the only runtime-fatal path in the design is a failed `dl` hotswap.
#[derive(Debug)]
pub enum ProcessFatal {
    HotswapFailed { lib_path: PathBuf, cause: DlError },
}

impl fmt::Display for ProcessFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessFatal::HotswapFailed { lib_path, cause } => write!(
                f,
                "fatal: hotswap of {} failed: {cause}",
                lib_path.display()
            ),
        }
    }
}

impl std::error::Error for ProcessFatal {}
