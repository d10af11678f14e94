//! In-memory runtime backend for unit tests.
//!
//! `FakeVm` hands out distinct fake context pointers and records every
//! attach, detach and destroy, flagging attach-while-attached and
//! detach-while-detached as violations.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::backend::{ContextPtr, LaunchConfig, LiveVm, Teardown, VmBackend};
use crate::error::LaunchFailure;
use crate::locator::Locator;
use crate::settings::VmSettings;

#[derive(Debug, Default)]
pub struct FakeVm {
    next_context: AtomicUsize,
    attached: Mutex<HashMap<ThreadId, ContextPtr>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    destroys: AtomicUsize,
    violations: AtomicUsize,
    attach_status: AtomicI32,
}

impl FakeVm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent attaches fail with `code`.
    pub fn fail_attach(&self, code: i32) {
        self.attach_status.store(code, Ordering::SeqCst);
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self, thread: ThreadId) -> bool {
        self.attached.lock().unwrap().contains_key(&thread)
    }
}

impl LiveVm for FakeVm {
    fn attach_current_thread(&self) -> Result<ContextPtr, i32> {
        let status = self.attach_status.load(Ordering::SeqCst);
        if status != 0 {
            return Err(status);
        }

        let mut attached = self.attached.lock().unwrap();
        let thread = thread::current().id();
        if attached.contains_key(&thread) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }

        // Fake addresses, never dereferenced.
        let id = self.next_context.fetch_add(1, Ordering::SeqCst) + 1;
        let context = ContextPtr::new((id * 16) as *mut c_void).unwrap();
        attached.insert(thread, context);
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(context)
    }

    fn detach_current_thread(&self) {
        let thread = thread::current().id();
        if self.attached.lock().unwrap().remove(&thread).is_none() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self, _teardown: Teardown) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

struct SharedVm(Arc<FakeVm>);

impl LiveVm for SharedVm {
    fn attach_current_thread(&self) -> Result<ContextPtr, i32> {
        self.0.attach_current_thread()
    }

    fn detach_current_thread(&self) {
        self.0.detach_current_thread()
    }

    fn destroy(&self, teardown: Teardown) {
        self.0.destroy(teardown)
    }
}

/// Backend whose launches produce [`FakeVm`]s, or fail on demand.
#[derive(Default)]
pub struct FakeBackend {
    launches: AtomicUsize,
    failure: Mutex<Option<LaunchFailure>>,
    panics: AtomicBool,
    delay: Mutex<Option<Duration>>,
    configs: Mutex<Vec<LaunchConfig>>,
    vms: Mutex<Vec<Arc<FakeVm>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, failure: LaunchFailure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    /// Make subsequent launches panic.
    pub fn panic_on_launch(&self) {
        self.panics.store(true, Ordering::SeqCst);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
        self.panics.store(false, Ordering::SeqCst);
    }

    pub fn slow_launch(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<LaunchConfig> {
        self.configs.lock().unwrap().last().cloned()
    }

    /// The most recently launched VM.
    pub fn vm(&self) -> Arc<FakeVm> {
        self.vms.lock().unwrap().last().cloned().unwrap()
    }
}

impl VmBackend for Arc<FakeBackend> {
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn LiveVm>, LaunchFailure> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config.clone());
        if let Some(delay) = *self.delay.lock().unwrap() {
            thread::sleep(delay);
        }
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        if self.panics.load(Ordering::SeqCst) {
            panic!("runtime aborted during launch");
        }

        // Like JNI_CreateJavaVM, launching leaves the caller attached.
        let vm = Arc::new(FakeVm::new());
        vm.attach_current_thread().map_err(LaunchFailure::from_status)?;
        self.vms.lock().unwrap().push(vm.clone());
        Ok(Box::new(SharedVm(vm)))
    }
}

/// Locator with a fixed answer that counts how often it was asked.
#[derive(Default)]
pub struct FixedLocator {
    pub found: bool,
    pub calls: AtomicUsize,
}

impl FixedLocator {
    pub fn found() -> Arc<Self> {
        Arc::new(Self {
            found: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Locator for Arc<FixedLocator> {
    fn locate(&self, _settings: &VmSettings) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.found
    }
}
