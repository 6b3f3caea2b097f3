use std::{path::Path, sync::Once};

use anyhow::Context;

static LOGGER_INIT: Once = Once::new();

/// Default logging configuration, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "log4rs.yaml";

/// Initializes the `log4rs` logger from `log4rs.yaml`, falling back to a
/// console logger at Debug level. Safe to call more than once.
pub fn init() {
    LOGGER_INIT.call_once(|| match init_from_file(DEFAULT_CONFIG_FILE) {
        Ok(()) => {
            log::info!(
                "utility_analysis logging initialized from {DEFAULT_CONFIG_FILE}."
            );
        }
        Err(e) => {
            eprintln!("ERROR: Failed to initialize logger: {e:#}");
            eprintln!("Falling back to basic stdout logging (Debug level).");
            match init_console_fallback() {
                Ok(()) => log::warn!(
                    "utility_analysis logging initialized using basic fallback (stdout, Debug level)."
                ),
                Err(e) => eprintln!(
                    "ERROR: Failed to initialize fallback logger: {e:#}. No logging will be available."
                ),
            }
        }
    });
}

/// Initializes `log4rs` from the given YAML configuration file.
pub fn init_from_file(path: impl AsRef<Path>) -> Result<(), anyhow::Error> {
    let path = path.as_ref();
    log4rs::init_file(path, Default::default()).with_context(|| {
        format!("cannot load logging configuration from {}", path.display())
    })
}

fn init_console_fallback() -> Result<(), anyhow::Error> {
    let stdout_appender = log4rs::append::console::ConsoleAppender::builder()
        .encoder(Box::new(log4rs::encode::pattern::PatternEncoder::new(
            "{h({d(%Y-%m-%d %H:%M:%S)(utc)} - {l} - {t}: {m}{n})}",
        )))
        .build();

    let config = log4rs::config::Config::builder()
        .appender(
            log4rs::config::Appender::builder()
                .build("stdout", Box::new(stdout_appender)),
        )
        .build(
            log4rs::config::Root::builder()
                .appender("stdout")
                .build(log::LevelFilter::Debug),
        )
        .context("cannot build fallback logging configuration")?;

    log4rs::init_config(config).context("cannot install fallback logger")?;
    Ok(())
}
