use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax, e.g.
/// `"lumen_engine=debug,wgpu=warn"`. When unset, `RUST_LOG` is consulted, then
/// everything at `info` is shown.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> Option<String> {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match config.filter() {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => {
                builder.filter_level(log::LevelFilter::Info);
            }
        }
        builder.write_style(config.write_style);

        if builder.try_init().is_err() {
            // another logger was installed first; keep it
            return;
        }
        log::debug!("logging initialized");
    });
}
