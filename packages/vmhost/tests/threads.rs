use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, ThreadId};

use vmhost::{
    AssumeFoundLocator, CollectingReporter, ContextPtr, HostError, LaunchConfig, LaunchFailure,
    LaunchOutcome, LiveVm, RuntimeHost, Teardown, VmBackend, VmSettings,
};

#[derive(Default)]
struct CountingVm {
    next: AtomicUsize,
    attached: Mutex<HashSet<ThreadId>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    double_attaches: AtomicUsize,
}

struct VmHandle(Arc<CountingVm>);

impl LiveVm for VmHandle {
    fn attach_current_thread(&self) -> Result<ContextPtr, i32> {
        self.0.attach()
    }

    fn detach_current_thread(&self) {
        self.0.detach()
    }

    fn destroy(&self, _teardown: Teardown) {}
}

impl CountingVm {
    fn attach(&self) -> Result<ContextPtr, i32> {
        if !self.attached.lock().unwrap().insert(thread::current().id()) {
            self.double_attaches.fetch_add(1, Ordering::SeqCst);
        }
        self.attaches.fetch_add(1, Ordering::SeqCst);
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ContextPtr::new((id * 8) as *mut c_void).unwrap())
    }

    fn detach(&self) {
        self.attached.lock().unwrap().remove(&thread::current().id());
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

struct Backend {
    vm: Arc<CountingVm>,
    status: Option<i32>,
}

impl VmBackend for Backend {
    fn launch(&self, _config: &LaunchConfig) -> Result<Box<dyn LiveVm>, LaunchFailure> {
        if let Some(status) = self.status {
            return Err(LaunchFailure::from_status(status));
        }
        self.vm.attach().map_err(LaunchFailure::from_status)?;
        Ok(Box::new(VmHandle(self.vm.clone())))
    }
}

fn launched_host() -> (Arc<RuntimeHost>, Arc<CountingVm>) {
    let vm = Arc::new(CountingVm::default());
    let host = RuntimeHost::new(Backend {
        vm: vm.clone(),
        status: None,
    })
    .with_locator(AssumeFoundLocator);
    host.create_instance("app.jar", &VmSettings::default()).unwrap();
    (Arc::new(host), vm)
}

#[test]
fn many_threads_each_get_their_own_attachment() {
    let (host, vm) = launched_host();
    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));

    let contexts: Vec<usize> = (0..threads)
        .map(|_| {
            let host = host.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let factory = host.get_instance().unwrap();
                let scope = factory.acquire().unwrap();
                let nested = factory.acquire().unwrap();
                assert_eq!(scope.context(), nested.context());
                // Hold the attachment until every thread has one.
                barrier.wait();
                scope.context().as_ptr() as usize
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let distinct: HashSet<_> = contexts.iter().collect();
    assert_eq!(distinct.len(), threads);
    assert!(host.get_instance().unwrap().threads().is_empty());
    assert_eq!(vm.double_attaches.load(Ordering::SeqCst), 0);
    // One attach/detach pair per worker plus the launching thread.
    assert_eq!(vm.attaches.load(Ordering::SeqCst), threads + 1);
    assert_eq!(vm.detaches.load(Ordering::SeqCst), threads + 1);
}

#[test]
fn short_units_of_work_reattach_cleanly() {
    let (host, vm) = launched_host();
    let factory = host.get_instance().unwrap();

    for _ in 0..500 {
        let _scope = factory.acquire().unwrap();
        assert_eq!(factory.threads().len(), 1);
    }

    assert!(factory.threads().is_empty());
    assert_eq!(vm.attaches.load(Ordering::SeqCst), 501);
    assert_eq!(vm.detaches.load(Ordering::SeqCst), 501);
}

#[test]
fn partial_unregister_leaves_remaining_count() {
    let (host, _vm) = launched_host();
    let factory = host.get_instance().unwrap();
    let me = thread::current().id();

    factory.create_context().unwrap();
    for _ in 0..5 {
        factory.register().unwrap();
    }
    for _ in 0..3 {
        factory.unregister().unwrap();
    }
    assert_eq!(factory.threads().users(me), Some(2));

    factory.unregister().unwrap();
    factory.unregister().unwrap();
    assert_eq!(factory.threads().users(me), None);
}

#[test]
fn stray_unregister_does_not_disturb_other_threads() {
    let (host, _vm) = launched_host();
    let factory = host.get_instance().unwrap();

    let scope = factory.acquire().unwrap();
    let worker = {
        let host = host.clone();
        thread::spawn(move || {
            let factory = host.get_instance().unwrap();
            matches!(
                factory.unregister(),
                Err(HostError::InternalConsistency { .. })
            )
        })
    };
    assert!(worker.join().unwrap());

    assert_eq!(factory.threads().len(), 1);
    assert_eq!(factory.threads().users(thread::current().id()), Some(1));
    drop(scope);
    assert!(factory.threads().is_empty());
}

#[test]
fn second_vm_in_process_is_reported() {
    let reporter = Arc::new(CollectingReporter::new());
    let host = RuntimeHost::new(Backend {
        vm: Arc::new(CountingVm::default()),
        status: Some(-5),
    })
    .with_locator(AssumeFoundLocator)
    .with_reporter(reporter.clone());

    let err = host
        .create_instance("app.jar", &VmSettings::default())
        .unwrap_err();

    assert!(matches!(err, HostError::Launch(LaunchFailure::AlreadyExists)));
    assert!(host.get_instance().is_none());
    let messages = reporter.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_error);
}

#[test]
fn relaunch_with_same_path_is_idempotent() {
    let (host, vm) = launched_host();
    assert_eq!(
        host.create_instance("app.jar", &VmSettings::default()).unwrap(),
        LaunchOutcome::AlreadyLive
    );
    assert_eq!(vm.attaches.load(Ordering::SeqCst), 1);
}
