//! # vmhost
//!
//! Embeds one Java virtual machine in a long-lived host process and lets any
//! number of host threads call into it concurrently.
//!
//! ## Core Concepts
//!
//! ### One runtime per process
//!
//! The JVM's invocation API allows a single VM per process, and a destroyed
//! VM cannot be created again. [`RuntimeHost`] therefore launches at most
//! once. The class path used for that launch is fixed: asking again with the
//! same class path is a no-op, asking with a different one is a
//! [`HostError::ConfigurationConflict`].
//!
//! ### Runtime discovery
//!
//! Before launching, a [`Locator`] checks that a JVM library is installed.
//! Each platform has its own strategy; see [`locator`]. A missing runtime is
//! reported to the user rather than crashing the host.
//!
//! ### Thread attachments
//!
//! Every host thread that calls into the JVM needs its own attachment (a
//! `JNIEnv*`). The factory keeps a table from thread to attachment and user
//! count. The first user on a thread attaches it; the last one to leave
//! detaches it:
//!
//! ```text
//!   thread A ── acquire ──▶ attach, users=1
//!   thread A ── acquire ──▶         users=2   (same JNIEnv)
//!   thread A ── drop ─────▶         users=1
//!   thread A ── drop ─────▶ detach, entry removed
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmhost::{JniBackend, RuntimeHost, VmSettings};
//!
//! let settings = VmSettings::load("settings.json")?.with_env_overrides()?;
//! let host = Arc::new(RuntimeHost::new(JniBackend::new(&settings)));
//! host.create_instance("indexer.jar", &settings)?;
//!
//! let worker = {
//!     let host = host.clone();
//!     std::thread::spawn(move || {
//!         let factory = host.get_instance().unwrap();
//!         let scope = factory.acquire().unwrap();
//!         let mut env = scope.jni_env().unwrap();
//!         vmhost::jvm::system_property(&mut env, "java.version")
//!     })
//! };
//! ```
//!
//! ## Teardown
//!
//! Dropping the last reference to the factory destroys the VM even if other
//! threads are still attached; a warning is logged and nothing is drained.
//! Process exit always wins.

pub mod backend;
pub mod error;
pub mod factory;
pub mod jvm;
pub mod locator;
pub mod report;
pub mod settings;
pub mod table;

#[cfg(test)]
mod testing;

pub use backend::{ContextPtr, LaunchConfig, LiveVm, Teardown, VmBackend};
pub use error::{HostError, LaunchFailure, Result, SettingsError};
pub use factory::{
    ContextHandle, ExecutionScope, HostState, LaunchOutcome, RuntimeFactory, RuntimeHost,
};
pub use jvm::{JniBackend, JniVm};
pub use locator::{
    platform_locator, AssumeFoundLocator, DylibProbeLocator, FileProbe, Locator, PathEnvLocator,
    StdFileProbe,
};
pub use report::{CollectingReporter, LogReporter, Reporter, StatusMessage};
pub use settings::VmSettings;
pub use table::ThreadTable;
