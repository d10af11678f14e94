//! Runtime discovery.
//!
//! Before launching, the host checks whether a JVM library is installed and
//! loadable. How that is decided depends on the platform, so each approach
//! is a [`Locator`] strategy and [`platform_locator`] picks the one for the
//! build target. Locating never starts the runtime; a library opened as a
//! probe is closed again and the launch loads it on its own.

use std::path::{Path, PathBuf};

use crate::settings::VmSettings;

/// Answers whether a runtime is available.
pub trait Locator: Send + Sync {
    /// Returns `true` if a runtime library was found.
    ///
    /// Never fails; an unusable installation is simply "not found".
    fn locate(&self, settings: &VmSettings) -> bool;
}

/// File existence check used by locators that inspect the filesystem.
pub trait FileProbe: Send + Sync {
    /// Whether a regular file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// [`FileProbe`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileProbe;

impl FileProbe for StdFileProbe {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Library candidates under an install directory, in priority order:
/// the bundled JRE layout, the flat layout, then the bare library name so
/// the system loader's search path applies.
pub fn library_candidates(java_path: Option<&Path>, library: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(dir) = java_path.filter(|dir| !dir.as_os_str().is_empty()) {
        candidates.push(dir.join("jre").join("lib").join("server").join(library));
        candidates.push(dir.join(library));
    }
    candidates.push(PathBuf::from(library));
    candidates
}

/// Appends `dir` to the search-path style variable `var`.
///
/// The change lasts for the rest of the process and is never undone.
pub(crate) fn append_search_dir(var: &str, dir: &Path) {
    let mut paths: Vec<PathBuf> = std::env::var_os(var)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    if paths.iter().any(|existing| existing == dir) {
        return;
    }
    paths.push(dir.to_path_buf());

    match std::env::join_paths(paths) {
        Ok(joined) => {
            tracing::debug!(var, dir = %dir.display(), "extended library search path");
            std::env::set_var(var, joined);
        }
        Err(e) => {
            tracing::warn!(var, dir = %dir.display(), error = %e, "cannot extend search path")
        }
    }
}

/// Windows strategy: put `<java_path>/client` on `PATH` and check that
/// `jvm.dll` is there.
pub struct PathEnvLocator<F = StdFileProbe> {
    probe: F,
    var: String,
}

impl PathEnvLocator<StdFileProbe> {
    pub fn new() -> Self {
        Self::with_probe(StdFileProbe)
    }
}

impl Default for PathEnvLocator<StdFileProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileProbe> PathEnvLocator<F> {
    /// Use a custom filesystem probe.
    pub fn with_probe(probe: F) -> Self {
        Self {
            probe,
            var: "PATH".to_string(),
        }
    }

    /// Extend a different environment variable instead of `PATH`.
    pub fn env_var(mut self, var: impl Into<String>) -> Self {
        self.var = var.into();
        self
    }
}

impl<F: FileProbe> Locator for PathEnvLocator<F> {
    fn locate(&self, settings: &VmSettings) -> bool {
        let Some(java_path) = settings
            .java_path
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
        else {
            tracing::debug!("no java path configured");
            return false;
        };

        let client = java_path.join("client");
        append_search_dir(&self.var, &client);
        self.probe.exists(&client.join("jvm.dll"))
    }
}

/// macOS strategy: try to open the library at each candidate location.
#[derive(Debug, Clone)]
pub struct DylibProbeLocator {
    library: String,
}

impl DylibProbeLocator {
    pub fn new() -> Self {
        Self::with_library("libjvm.dylib")
    }

    /// Probe for a differently named library.
    pub fn with_library(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
        }
    }
}

impl Default for DylibProbeLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator for DylibProbeLocator {
    fn locate(&self, settings: &VmSettings) -> bool {
        for candidate in library_candidates(settings.java_path.as_deref(), &self.library) {
            // SAFETY: loading a JVM library runs no user code beyond its
            // initializers; the handle is dropped right away.
            match unsafe { libloading::Library::new(&candidate) } {
                Ok(_probe) => {
                    tracing::debug!(library = %candidate.display(), "runtime library found");
                    return true;
                }
                Err(e) => {
                    tracing::debug!(library = %candidate.display(), error = %e, "probe failed");
                }
            }
        }
        false
    }
}

/// Strategy for platforms without special handling: report found and let
/// the launch call surface any problem.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeFoundLocator;

impl Locator for AssumeFoundLocator {
    fn locate(&self, _settings: &VmSettings) -> bool {
        true
    }
}

/// The locator for the platform this crate was built for.
pub fn platform_locator() -> Box<dyn Locator> {
    #[cfg(windows)]
    {
        Box::new(PathEnvLocator::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(DylibProbeLocator::new())
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Box::new(AssumeFoundLocator)
    }
}
