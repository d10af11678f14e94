//! Command-line launcher for the embedded JVM.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use thiserror::Error;
use vmhost::{
    platform_locator, HostError, JniBackend, Reporter, RuntimeHost, SettingsError, StatusMessage,
    VmSettings,
};

/// vmhost - launch and exercise an embedded JVM
#[derive(Parser, Debug)]
#[command(name = "vmhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a JVM can be found
    Locate {
        /// JVM installation directory
        #[arg(long)]
        java_path: Option<PathBuf>,
    },

    /// Launch the JVM and read a system property from several threads
    Run {
        /// Class path for the JVM
        #[arg(long)]
        class_path: Option<String>,

        /// Number of worker threads
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// System property each worker reads
        #[arg(long, default_value = "java.version")]
        property: String,
    },

    /// Print the effective settings
    Settings,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("JNI call failed: {0}")]
    Jni(#[from] jni::errors::Error),

    #[error("no class path given and none configured")]
    MissingClassPath,

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("settings could not be printed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shows user-facing status messages on stderr.
struct StderrReporter;

impl Reporter for StderrReporter {
    fn dispatch(&self, message: StatusMessage) {
        if message.is_error {
            eprintln!("vmhost: {}", message.text);
        } else {
            eprintln!("{}", message.text);
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<VmSettings, CliError> {
    let settings = match path.map(PathBuf::as_path).or(VmSettings::default_path()) {
        Some(path) => VmSettings::load(path)?,
        None => VmSettings::default(),
    };
    Ok(settings.with_env_overrides()?)
}

fn run(args: Args) -> Result<(), CliError> {
    let mut settings = load_settings(args.settings.as_ref())?;

    match args.command {
        Command::Locate { java_path } => {
            if java_path.is_some() {
                settings.java_path = java_path;
            }
            if platform_locator().locate(&settings) {
                println!("found");
                Ok(())
            } else {
                Err(HostError::RuntimeNotFound.into())
            }
        }
        Command::Run {
            class_path,
            threads,
            property,
        } => {
            let class_path = class_path
                .or_else(|| settings.class_path.clone())
                .ok_or(CliError::MissingClassPath)?;
            launch_and_read(&settings, &class_path, threads, &property)
        }
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn launch_and_read(
    settings: &VmSettings,
    class_path: &str,
    threads: usize,
    property: &str,
) -> Result<(), CliError> {
    let host = Arc::new(
        RuntimeHost::new(JniBackend::new(settings)).with_reporter(Arc::new(StderrReporter)),
    );
    host.create_instance(class_path, settings)?;
    if let Some(factory) = host.get_instance() {
        tracing::info!(options = ?factory.launch_config().options, "JVM ready");
    }

    let workers: Vec<_> = (0..threads.max(1))
        .map(|worker| {
            let host = host.clone();
            let property = property.to_string();
            thread::spawn(move || -> Result<(usize, Option<String>), CliError> {
                let factory = host.get_instance().ok_or(HostError::RuntimeNotFound)?;
                let scope = factory.acquire()?;
                let mut env = scope.jni_env()?;
                let value = vmhost::jvm::system_property(&mut env, &property)?;
                Ok((worker, value))
            })
        })
        .collect();

    for handle in workers {
        let (worker, value) = handle.join().map_err(|_| CliError::WorkerPanicked)??;
        match value {
            Some(value) => println!("worker {}: {} = {}", worker, property, value),
            None => println!("worker {}: {} is not set", worker, property),
        }
    }

    if let Some(factory) = host.get_instance() {
        tracing::info!(attached = factory.threads().len(), "all workers finished");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmhost=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
