use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// `RUST_LOG` wins when set; otherwise `GRADER_LOG_LEVEL` applies to this crate and the
/// HTTP trace layer while dependencies stay at `warn`.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&settings.telemetry().log_level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let installed = if settings.telemetry().json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::info!(
        environment = %settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "Tracing initialised"
    );
    Ok(())
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("warn,essay_grader={level},tower_http={level}"))
}

#[cfg(test)]
mod tests {
    use super::default_filter;

    #[test]
    fn default_filter_scopes_level_to_this_crate() {
        let rendered = default_filter("debug").to_string();

        assert!(rendered.contains("essay_grader=debug"));
        assert!(rendered.contains("tower_http=debug"));
        assert!(rendered.contains("warn"));
    }
}
