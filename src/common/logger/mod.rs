use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::LineFormatter;
pub use writer::strip_ansi_escapes;
use writer::RollingLogFile;

use crate::configs::Config;

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<RollingLogFile> = OnceLock::new();

#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::append_to_file_raw("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

/// Mirrors raw console output into the log file, if one is configured.
pub fn append_to_file_raw(msg: &str) {
    if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
        use std::io::Write;
        let _ = writer.write_all(strip_ansi_escapes(msg).as_bytes());
    }
}

/// Builds the filter directive from the logging section.
///
/// Noisy HTTP internals are capped at `warn` unless the filters override them.
pub fn filter_directive(config: &Config) -> String {
    let level = config.logging.level.as_deref().unwrap_or("info");
    let filters = config.logging.filters.as_deref().unwrap_or("").trim();

    if filters.is_empty() {
        format!("{},hyper=warn,reqwest=warn,symphonia=warn", level)
    } else {
        format!("{},hyper=warn,reqwest=warn,symphonia=warn,{}", level, filters)
    }
}

pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(LineFormatter::new(true))
        .with_ansi(true);

    let file_layer = config.logging.file.as_ref().map(|file_config| {
        if let Some(parent) = Path::new(&file_config.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {}", e);
            }
        }

        let writer = RollingLogFile::new(&file_config.path, file_config.max_lines);
        let _ = GLOBAL_FILE_WRITER.set(writer.clone());
        fmt::layer()
            .with_writer(writer)
            .event_format(LineFormatter::new(false))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LoggingConfig;

    #[test]
    fn test_filter_directive() {
        let mut config = Config::default();
        assert_eq!(
            filter_directive(&config),
            "info,hyper=warn,reqwest=warn,symphonia=warn"
        );

        config.logging = LoggingConfig {
            level: Some("debug".into()),
            filters: Some("saybot::voice=trace".into()),
            file: None,
        };
        assert_eq!(
            filter_directive(&config),
            "debug,hyper=warn,reqwest=warn,symphonia=warn,saybot::voice=trace"
        );
    }
}
