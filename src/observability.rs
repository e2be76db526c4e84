use crate::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(log_level: &str) -> String {
    format!("false_alarm_classifier={level},fac_cli={level},tower_http={level}", level = log_level)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// a subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter = default_filter("debug");
        assert!(filter.contains("false_alarm_classifier=debug"));
        assert!(filter.contains("tower_http=debug"));
    }
}
