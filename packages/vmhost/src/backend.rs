//! The seam between thread bookkeeping and the actual runtime.
//!
//! A [`VmBackend`] knows how to create the runtime once; the [`LiveVm`] it
//! returns knows how to attach and detach the calling thread. The JNI
//! implementation lives in [`crate::jvm`]; tests use an in-memory one.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::error::LaunchFailure;

/// Initial heap option, fixed.
pub const MIN_HEAP_OPTION: &str = "-Xms1m";

/// Interface version requested at launch.
pub const JNI_VERSION: i32 = jni::sys::JNI_VERSION_1_6;

/// The options a runtime is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Raw option strings, in order.
    pub options: Vec<String>,
    /// Requested interface version.
    pub version: i32,
    /// Whether the runtime may skip options it does not understand.
    pub ignore_unrecognized: bool,
}

impl LaunchConfig {
    /// Class path, minimum heap and maximum heap; unknown options fail.
    pub fn new(search_path: &str, max_heap_mb: u32) -> Self {
        Self {
            options: vec![
                format!("-Djava.class.path={}", search_path),
                MIN_HEAP_OPTION.to_string(),
                format!("-Xmx{}m", max_heap_mb),
            ],
            version: JNI_VERSION,
            ignore_unrecognized: false,
        }
    }
}

/// A thread's execution context inside the runtime (a `JNIEnv*`).
///
/// Only meaningful on the thread that attached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextPtr(NonNull<c_void>);

// The pointer is only stored and compared off-thread; it is dereferenced
// solely by the thread that owns the attachment.
unsafe impl Send for ContextPtr {}

impl ContextPtr {
    /// Wrap a raw context pointer; `None` if null.
    pub fn new(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Creates the runtime. Called at most once per host.
pub trait VmBackend: Send + Sync {
    /// Launch the runtime with `config`.
    ///
    /// On success the launching thread is still attached; the caller detaches
    /// it.
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn LiveVm>, LaunchFailure>;
}

/// A launched runtime.
pub trait LiveVm: Send + Sync {
    /// Attach the calling thread, returning its context.
    fn attach_current_thread(&self) -> Result<ContextPtr, i32>;

    /// Detach the calling thread.
    fn detach_current_thread(&self);

    /// Tear the runtime down.
    ///
    /// Only [`RuntimeFactory`](crate::RuntimeFactory) can produce a
    /// [`Teardown`], so this runs once, from its destructor.
    fn destroy(&self, teardown: Teardown);
}

/// Permission to destroy a [`LiveVm`], held only by the factory.
///
/// Code outside this crate can implement [`LiveVm::destroy`] but cannot call
/// it:
///
/// ```compile_fail
/// let _ = vmhost::Teardown(());
/// ```
#[derive(Debug)]
pub struct Teardown(());

impl Teardown {
    pub(crate) fn new() -> Self {
        Teardown(())
    }
}
