//! Logging for the CLI: a `tracing` subscriber writing human readable events to
//! a terminal, or JSON lines when stderr is redirected.

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::style::ProgressStyle;
use tracing_indicatif::writer::{IndicatifWriter, Stderr};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Statics
//================================================================================================

/// Whether ANSI escape codes may be written.
pub static ANSI: AtomicBool = AtomicBool::new(true);

//================================================================================================
// Modules
//================================================================================================

/// ANSI escape codes for styling terminal output.
pub mod ansi {
    /// Magenta text.
    pub const MAGENTA: &str = "\x1b[35m";
    /// Reset styling.
    pub const RESET: &str = "\x1b[0m";
}

//================================================================================================
// Macros
//================================================================================================

/// Log an error as fatal.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {{
        use $crate::cli::logging::{ANSI, ansi};
        let ansi = ANSI.load(std::sync::atomic::Ordering::SeqCst);
        tracing::error!(
            fatal = true,
            "{}FATAL{} {:#}",
            if ansi { ansi::MAGENTA } else { "" },
            if ansi { ansi::RESET } else { "" },
            $error
        );
    }};
}

//================================================================================================
// Functions
//================================================================================================

/// Install the global subscriber. Events are flushed when the guard drops.
pub fn init_global_subscriber(args: LogArgs) -> WorkerGuard {
    let level = log_level(args);
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let progress = IndicatifLayer::new().with_progress_style(
        ProgressStyle::with_template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    tracing_subscriber::registry()
        .with(event_layer(progress.get_stderr_writer(), writer))
        .with(filter)
        .with(progress)
        .init();

    tracing::trace!(%level, "logging initialized");
    guard
}

fn event_layer<S>(
    terminal: IndicatifWriter<Stderr>,
    redirected: NonBlocking,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if std::io::stderr().is_terminal() {
        fmt::layer()
            .without_time()
            .with_writer(terminal)
            .with_target(false)
            .compact()
            .boxed()
    } else {
        ANSI.store(false, Ordering::SeqCst);
        fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(redirected)
            .boxed()
    }
}

fn log_level(args: LogArgs) -> LevelFilter {
    match args.quiet {
        0 => (),
        1 => return LevelFilter::WARN,
        _ => return LevelFilter::ERROR,
    }

    if let Some(level) = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .and_then(|v| LevelFilter::from_str(&v).ok())
    {
        return level;
    }

    match args.verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
