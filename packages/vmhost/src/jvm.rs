//! JNI backend for the real JVM.
//!
//! Loads the JVM shared library at runtime instead of linking against it, so
//! the host starts (and can report a missing runtime) on machines without a
//! JDK. The library stays mapped for the rest of the process once
//! `JNI_CreateJavaVM` has been called.

use std::ffi::{c_char, c_void, CString};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use jni::objects::{JString, JValue};
use jni::sys::{self, jint, JavaVMInitArgs, JavaVMOption, JNI_OK};
use jni::JNIEnv;
use libloading::Library;

use crate::backend::{ContextPtr, LaunchConfig, LiveVm, Teardown, VmBackend};
use crate::error::LaunchFailure;
use crate::factory::ExecutionScope;
use crate::locator::library_candidates;
use crate::settings::VmSettings;

#[cfg(windows)]
const LIBRARY_NAME: &str = "jvm.dll";
#[cfg(target_os = "macos")]
const LIBRARY_NAME: &str = "libjvm.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
const LIBRARY_NAME: &str = "libjvm.so";

type CreateJavaVm =
    unsafe extern "system" fn(*mut *mut sys::JavaVM, *mut *mut c_void, *mut c_void) -> jint;

/// Where to look for the JVM library, most specific first.
pub fn runtime_library_candidates(java_path: Option<&Path>, library: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = java_path.filter(|dir| !dir.as_os_str().is_empty()) {
        if cfg!(windows) {
            candidates.push(dir.join("client").join(library));
            candidates.push(dir.join("bin").join("server").join(library));
        }
        candidates.push(dir.join("lib").join("server").join(library));
    }
    candidates.extend(library_candidates(java_path, library));
    candidates
}

/// Launches the JVM through `JNI_CreateJavaVM`.
#[derive(Debug, Clone)]
pub struct JniBackend {
    java_path: Option<PathBuf>,
    library: String,
}

impl JniBackend {
    pub fn new(settings: &VmSettings) -> Self {
        Self {
            java_path: settings.java_path.clone(),
            library: LIBRARY_NAME.to_string(),
        }
    }

    /// Load a differently named library.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }

    pub fn candidates(&self) -> Vec<PathBuf> {
        runtime_library_candidates(self.java_path.as_deref(), &self.library)
    }

    fn open_library(&self) -> Result<Library, LaunchFailure> {
        let mut last_error = None;
        for candidate in self.candidates() {
            // SAFETY: the JVM library's initializers have no preconditions.
            match unsafe { Library::new(&candidate) } {
                Ok(library) => {
                    tracing::debug!(library = %candidate.display(), "loaded JVM library");
                    return Ok(library);
                }
                Err(e) => last_error = Some(format!("{}: {}", candidate.display(), e)),
            }
        }
        Err(LaunchFailure::LibraryUnavailable(
            last_error.unwrap_or_else(|| self.library.clone()),
        ))
    }
}

impl VmBackend for JniBackend {
    fn launch(&self, config: &LaunchConfig) -> Result<Box<dyn LiveVm>, LaunchFailure> {
        let library = self.open_library()?;

        // SAFETY: the signature matches the JNI invocation API.
        let create: CreateJavaVm = unsafe {
            *library
                .get::<CreateJavaVm>(b"JNI_CreateJavaVM\0")
                .map_err(|e| LaunchFailure::LibraryUnavailable(e.to_string()))?
        };

        let strings = config
            .options
            .iter()
            .map(|option| CString::new(option.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LaunchFailure::InvalidArgument)?;
        let mut options: Vec<JavaVMOption> = strings
            .iter()
            .map(|option| JavaVMOption {
                optionString: option.as_ptr() as *mut c_char,
                extraInfo: ptr::null_mut(),
            })
            .collect();
        let mut args = JavaVMInitArgs {
            version: config.version,
            nOptions: options.len() as jint,
            options: options.as_mut_ptr(),
            ignoreUnrecognized: if config.ignore_unrecognized {
                sys::JNI_TRUE
            } else {
                sys::JNI_FALSE
            },
        };

        let mut vm: *mut sys::JavaVM = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();
        // SAFETY: `args` and the option strings outlive the call.
        let status = unsafe {
            create(
                &mut vm,
                &mut env,
                &mut args as *mut JavaVMInitArgs as *mut c_void,
            )
        };

        // Unloading libjvm after a create attempt is not supported.
        std::mem::forget(library);

        if status != JNI_OK {
            return Err(LaunchFailure::from_status(status));
        }
        let vm = NonNull::new(vm).ok_or(LaunchFailure::Unknown(status))?;
        Ok(Box::new(JniVm { vm }))
    }
}

/// A JVM created by [`JniBackend`].
pub struct JniVm {
    vm: NonNull<sys::JavaVM>,
}

// The invocation interface may be used from any thread.
unsafe impl Send for JniVm {}
unsafe impl Sync for JniVm {}

impl JniVm {
    fn interface(&self) -> &sys::JNIInvokeInterface_ {
        // SAFETY: `vm` came from a successful JNI_CreateJavaVM and the
        // function table lives as long as the process.
        unsafe { &**self.vm.as_ptr() }
    }

}

impl LiveVm for JniVm {
    fn attach_current_thread(&self) -> Result<ContextPtr, i32> {
        let attach = self.interface().AttachCurrentThread.ok_or(sys::JNI_ERR)?;
        let mut env: *mut c_void = ptr::null_mut();
        // SAFETY: null thread arguments are allowed.
        let status = unsafe { attach(self.vm.as_ptr(), &mut env, ptr::null_mut()) };
        if status != JNI_OK {
            return Err(status);
        }
        ContextPtr::new(env).ok_or(sys::JNI_ERR)
    }

    fn detach_current_thread(&self) {
        let Some(detach) = self.interface().DetachCurrentThread else {
            return;
        };
        // SAFETY: the table only detaches threads it attached.
        let status = unsafe { detach(self.vm.as_ptr()) };
        if status != JNI_OK {
            tracing::warn!(status, "DetachCurrentThread failed");
        }
    }

    fn destroy(&self, _teardown: Teardown) {
        let Some(destroy) = self.interface().DestroyJavaVM else {
            return;
        };
        // SAFETY: called once, from the factory's destructor.
        let status = unsafe { destroy(self.vm.as_ptr()) };
        if status != JNI_OK {
            tracing::warn!(status, "DestroyJavaVM failed");
        }
    }
}

impl ExecutionScope<'_> {
    /// The scope's thread environment as a [`JNIEnv`].
    pub fn jni_env(&self) -> jni::errors::Result<JNIEnv<'_>> {
        // SAFETY: the context is this thread's JNIEnv and stays valid while
        // the scope keeps the thread attached. Scopes are not `Send`.
        unsafe { JNIEnv::from_raw(self.context().as_ptr() as *mut sys::JNIEnv) }
    }
}

/// Read a Java system property such as `java.version`.
pub fn system_property(env: &mut JNIEnv<'_>, key: &str) -> jni::errors::Result<Option<String>> {
    let key = env.new_string(key)?;
    let value = env
        .call_static_method(
            "java/lang/System",
            "getProperty",
            "(Ljava/lang/String;)Ljava/lang/String;",
            &[JValue::Object(&key)],
        )?
        .l()?;
    if value.is_null() {
        return Ok(None);
    }
    let value = JString::from(value);
    let text: String = env.get_string(&value)?.into();
    Ok(Some(text))
}
