//! Setup shared by every command.

use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use library_aggregator::Result;
use library_aggregator::config::Config;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Arguments shared by the commands that read source documents
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to configuration file [default: one of aggregate.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory holding the library source documents [default: from configuration, or `data`]
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

/// Configuration and paths resolved from the command line.
#[derive(Debug)]
pub struct Common {
    pub config: Config,
    pub data_dir: Utf8PathBuf,
}

impl Common {
    /// Initialize logging and load the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let (config, warnings) = Config::load(&Utf8PathBuf::from("."), args.config.as_ref())?;

        if !warnings.is_empty() {
            eprintln!("\n⚠️  Configuration validation warnings:");
            for warning in &warnings {
                eprintln!("   {warning}");
            }
            eprintln!();
        }

        let data_dir = args.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());

        Ok(Self { config, data_dir })
    }
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}
