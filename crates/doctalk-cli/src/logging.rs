use tracing_subscriber::EnvFilter;

/// Filter used when `DOCTALK_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn env_filter(value: Option<&str>) -> EnvFilter {
    value
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for answers.
///
/// `DOCTALK_LOG` takes an `EnvFilter` directive, `DOCTALK_LOG_FORMAT=json`
/// switches to one JSON object per event.
pub fn init() -> anyhow::Result<()> {
    let filter_var = std::env::var("DOCTALK_LOG").ok();
    let format_var = std::env::var("DOCTALK_LOG_FORMAT").ok();
    let filter = env_filter(filter_var.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match LogFormat::from_env(format_var.as_deref()) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
