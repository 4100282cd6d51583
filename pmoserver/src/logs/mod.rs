// logs.rs
use pmoconfig::get_config;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Options d'initialisation du système de logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Niveau minimum (ERROR, WARN, INFO, DEBUG, TRACE), ignoré si `RUST_LOG` est défini
    pub min_level: String,
    /// Activer la sortie vers stderr/stdout
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: "INFO".to_string(),
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    /// Options lues depuis `host.logger` dans la configuration
    pub fn from_config() -> Self {
        let config = get_config();
        let defaults = Self::default();
        Self {
            min_level: config.get_log_min_level().unwrap_or(defaults.min_level),
            enable_console: config
                .get_log_enable_console()
                .unwrap_or(defaults.enable_console),
        }
    }

    /// Filtre effectif : `RUST_LOG` s'il est défini, sinon le niveau configuré
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(self.level_filter().into()))
    }

    /// Niveau configuré ; un niveau inconnu retombe sur INFO
    pub fn level_filter(&self) -> LevelFilter {
        match string_to_level(&self.min_level) {
            Some(level) => level_to_levelfilter(level),
            None => {
                eprintln!("Unknown log level {:?}, using INFO", self.min_level);
                LevelFilter::INFO
            }
        }
    }
}

/// Initialise le système de logging
///
/// # Exemple
/// ```rust,no_run
/// use pmoserver::logs::{init_logging, LoggingOptions};
///
/// init_logging(LoggingOptions {
///     min_level: "DEBUG".to_string(),
///     enable_console: true,
/// });
/// ```
pub fn init_logging(options: LoggingOptions) {
    let subscriber = Registry::default().with(options.env_filter());

    let result = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    match level {
        Level::ERROR => LevelFilter::ERROR,
        Level::WARN => LevelFilter::WARN,
        Level::INFO => LevelFilter::INFO,
        Level::DEBUG => LevelFilter::DEBUG,
        Level::TRACE => LevelFilter::TRACE,
    }
}
