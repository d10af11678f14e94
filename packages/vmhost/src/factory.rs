//! The host-wide runtime and its per-thread contexts.
//!
//! [`RuntimeHost`] is created once by the application's startup code and
//! passed to whoever needs the runtime. It moves through
//! `Uninitialized → Launching → Live` and never back: the JVM cannot be
//! destroyed and relaunched inside one process, so once a class path has
//! been launched it is fixed for good.
//!
//! The live [`RuntimeFactory`] hands out thread contexts. The preferred way
//! in is [`RuntimeFactory::acquire`], which returns an [`ExecutionScope`]
//! that keeps the thread attached for as long as it lives:
//!
//! ```ignore
//! let host = RuntimeHost::new(JniBackend::new(&settings));
//! host.create_instance("indexer.jar", &settings)?;
//!
//! let factory = host.get_instance().expect("launched above");
//! let scope = factory.acquire()?;
//! let mut env = scope.jni_env()?;
//! // ... call into Java ...
//! drop(scope); // last user on this thread: detaches
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::backend::{ContextPtr, LaunchConfig, LiveVm, Teardown, VmBackend};
use crate::error::{HostError, Result};
use crate::locator::{platform_locator, Locator};
use crate::report::{LogReporter, Reporter, StatusMessage};
use crate::settings::VmSettings;
use crate::table::ThreadTable;

/// Lifecycle of the host's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// No launch has succeeded yet.
    Uninitialized,
    /// A launch is in progress.
    Launching,
    /// The runtime is running.
    Live,
}

/// Successful result of [`RuntimeHost::create_instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// This call launched the runtime.
    Launched,
    /// The runtime was already live with the same class path.
    AlreadyLive,
}

/// Owner of the single runtime.
pub struct RuntimeHost {
    backend: Box<dyn VmBackend>,
    locator: Box<dyn Locator>,
    reporter: Arc<dyn Reporter>,
    launch_guard: Mutex<()>,
    launching: AtomicBool,
    factory: OnceLock<Arc<RuntimeFactory>>,
}

impl RuntimeHost {
    /// A host using the platform locator and log-only reporting.
    pub fn new(backend: impl VmBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            locator: platform_locator(),
            reporter: Arc::new(LogReporter),
            launch_guard: Mutex::new(()),
            launching: AtomicBool::new(false),
            factory: OnceLock::new(),
        }
    }

    /// Replace the runtime locator.
    pub fn with_locator(mut self, locator: impl Locator + 'static) -> Self {
        self.locator = Box::new(locator);
        self
    }

    /// Replace the status reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> HostState {
        if self.factory.get().is_some() {
            HostState::Live
        } else if self.launching.load(Ordering::SeqCst) {
            HostState::Launching
        } else {
            HostState::Uninitialized
        }
    }

    /// Launch the runtime with `search_path` as its class path.
    ///
    /// Idempotent for the same class path. A different class path once the
    /// runtime is live is a [`HostError::ConfigurationConflict`] and leaves the
    /// live runtime untouched. Concurrent first calls are serialized; exactly
    /// one of them launches.
    pub fn create_instance(
        &self,
        search_path: &str,
        settings: &VmSettings,
    ) -> Result<LaunchOutcome> {
        if let Some(factory) = self.factory.get() {
            return self.check_live(factory, search_path);
        }

        let _guard = self
            .launch_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(factory) = self.factory.get() {
            return self.check_live(factory, search_path);
        }

        // Cleared on drop, so only after publishing or on failure.
        let _launching = LaunchingFlag::raise(&self.launching);
        let launched = self.launch(search_path, settings)?;

        // Only the guard holder publishes, so the slot is still empty.
        let _ = self.factory.set(Arc::new(launched));
        Ok(LaunchOutcome::Launched)
    }

    /// The live factory, if any. Never launches.
    pub fn get_instance(&self) -> Option<Arc<RuntimeFactory>> {
        self.factory.get().cloned()
    }

    fn check_live(&self, factory: &RuntimeFactory, search_path: &str) -> Result<LaunchOutcome> {
        if factory.search_path() == search_path {
            Ok(LaunchOutcome::AlreadyLive)
        } else {
            Err(self.fail(HostError::ConfigurationConflict {
                configured: factory.search_path().to_string(),
                requested: search_path.to_string(),
            }))
        }
    }

    fn launch(&self, search_path: &str, settings: &VmSettings) -> Result<RuntimeFactory> {
        if !self.locator.locate(settings) {
            return Err(self.fail(HostError::RuntimeNotFound));
        }

        let config = LaunchConfig::new(search_path, settings.max_heap_mb);
        tracing::debug!(options = ?config.options, "launching JVM");

        let vm = self
            .backend
            .launch(&config)
            .map_err(|reason| self.fail(HostError::Launch(reason)))?;

        // The launching thread is not assumed to be a long-term user.
        vm.detach_current_thread();
        tracing::info!(class_path = search_path, "JVM launched");

        Ok(RuntimeFactory {
            vm,
            search_path: search_path.to_string(),
            launch_config: config,
            table: ThreadTable::new(),
        })
    }

    fn fail(&self, error: HostError) -> HostError {
        tracing::error!(%error, "runtime unavailable");
        self.reporter.dispatch(StatusMessage::error(error.to_string()));
        error
    }
}

/// Holds [`HostState::Launching`] for as long as it lives.
struct LaunchingFlag<'a>(&'a AtomicBool);

impl<'a> LaunchingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LaunchingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The live runtime plus its thread registration table.
///
/// The runtime itself is not exposed: attaching and detaching go through the
/// table, and only the destructor tears it down.
pub struct RuntimeFactory {
    vm: Box<dyn LiveVm>,
    search_path: String,
    launch_config: LaunchConfig,
    table: ThreadTable,
}

impl RuntimeFactory {
    /// The class path fixed at launch.
    pub fn search_path(&self) -> &str {
        &self.search_path
    }

    /// The options the runtime was launched with.
    pub fn launch_config(&self) -> &LaunchConfig {
        &self.launch_config
    }

    /// The thread registration table, for inspection.
    pub fn threads(&self) -> &ThreadTable {
        &self.table
    }

    /// Attach the calling thread and count one user, released when the
    /// returned scope is dropped.
    pub fn acquire(&self) -> Result<ExecutionScope<'_>> {
        let context = self.table.resolve(self.vm.as_ref(), true)?;
        Ok(ExecutionScope {
            factory: self,
            context,
            _thread_bound: PhantomData,
        })
    }

    /// Context for the calling thread without counting a user.
    ///
    /// Work done through it must be bracketed by [`register`](Self::register)
    /// and [`unregister`](Self::unregister); prefer [`acquire`](Self::acquire).
    pub fn create_context(&self) -> Result<ContextHandle<'_>> {
        let context = self.table.resolve(self.vm.as_ref(), false)?;
        Ok(ContextHandle {
            _factory: self,
            context,
            _thread_bound: PhantomData,
        })
    }

    /// Count one more user on the calling thread.
    pub fn register(&self) -> Result<()> {
        self.table.register().map(|_| ())
    }

    /// Count one user less on the calling thread, detaching it on the last.
    pub fn unregister(&self) -> Result<()> {
        self.table.unregister(self.vm.as_ref()).map(|_| ())
    }
}

impl Drop for RuntimeFactory {
    // Process exit wins: attached threads are not waited for.
    fn drop(&mut self) {
        let attached = self.table.len();
        if attached > 0 {
            tracing::warn!(attached, "destroying JVM while threads are still attached");
        }
        self.vm.destroy(Teardown::new());
        tracing::debug!("JVM destroyed");
    }
}

/// A thread's context, obtained via [`RuntimeFactory::create_context`].
///
/// Does not keep the thread attached by itself.
pub struct ContextHandle<'f> {
    _factory: &'f RuntimeFactory,
    context: ContextPtr,
    _thread_bound: PhantomData<*const ()>,
}

impl ContextHandle<'_> {
    pub fn context(&self) -> ContextPtr {
        self.context
    }
}

/// A counted use of the calling thread's context.
///
/// Dropping it unregisters, detaching the thread if it was the last user.
pub struct ExecutionScope<'f> {
    factory: &'f RuntimeFactory,
    context: ContextPtr,
    _thread_bound: PhantomData<*const ()>,
}

impl ExecutionScope<'_> {
    pub fn context(&self) -> ContextPtr {
        self.context
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        // Errors are logged by the table.
        let _ = self.factory.unregister();
    }
}
