//! Error types for the embedded runtime host.

use std::thread::ThreadId;

use thiserror::Error;

/// Why a runtime launch failed.
///
/// The first five variants correspond to the status codes returned by
/// `JNI_CreateJavaVM`; [`LaunchFailure::from_status`] performs that mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchFailure {
    /// The runtime does not support the requested interface version.
    #[error("JVM is outdated and doesn't meet requirements")]
    VersionMismatch,

    /// The runtime could not reserve its initial heap.
    #[error("not enough memory for JVM")]
    OutOfMemory,

    /// One of the launch options was rejected.
    #[error("invalid argument for launching JVM")]
    InvalidArgument,

    /// The runtime's own one-per-process guard tripped.
    #[error("the process can only launch one JVM and not more")]
    AlreadyExists,

    /// Any other status code.
    #[error("could not create the JVM instance (error code {0})")]
    Unknown(i32),

    /// The runtime's shared library or its entry point could not be loaded.
    #[error("could not load the JVM library: {0}")]
    LibraryUnavailable(String),
}

impl LaunchFailure {
    /// Map a non-OK status code from the runtime's creation call.
    pub fn from_status(code: i32) -> Self {
        match code {
            jni::sys::JNI_EVERSION => LaunchFailure::VersionMismatch,
            jni::sys::JNI_ENOMEM => LaunchFailure::OutOfMemory,
            jni::sys::JNI_EINVAL => LaunchFailure::InvalidArgument,
            jni::sys::JNI_EEXIST => LaunchFailure::AlreadyExists,
            other => LaunchFailure::Unknown(other),
        }
    }
}

/// Errors surfaced by [`RuntimeHost`](crate::RuntimeHost) and
/// [`RuntimeFactory`](crate::RuntimeFactory).
///
/// None of these are fatal to the process; the caller simply does not get
/// the resource it asked for.
#[derive(Debug, Error)]
pub enum HostError {
    /// The locator found no loadable runtime.
    #[error("Unable to locate Java on this machine.")]
    RuntimeNotFound,

    /// A launch was requested with a class path other than the live one.
    #[error(
        "java classpath cannot be changed (configured {configured:?}, requested {requested:?})"
    )]
    ConfigurationConflict {
        /// The class path the runtime was launched with.
        configured: String,
        /// The class path of the rejected request.
        requested: String,
    },

    /// The runtime's creation call failed.
    #[error("Error while creating Java environment: {0}")]
    Launch(#[from] LaunchFailure),

    /// Register or unregister was called for a thread with no usable entry.
    #[error("no execution context registered for {thread:?} during {operation}")]
    InternalConsistency {
        /// The bookkeeping operation that found the table inconsistent.
        operation: &'static str,
        /// The calling thread.
        thread: ThreadId,
    },

    /// The runtime refused to attach the current thread.
    #[error("failed to attach thread to the JVM (error code {0})")]
    AttachFailed(i32),
}

/// Errors reading or writing a settings document.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The document was not valid settings JSON.
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidOverride {
        /// Environment variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
