use super::parsing::{
    env_number, env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
};
use super::types::{
    ApiSettings, CacheSettings, ConfigError, DatabaseSettings, GradingSettings, RedisSettings,
    RemoteSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADER_HOST", "0.0.0.0");
        let port = env_or_default("GRADER_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRADER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Essay Grader API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");
        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = env_number("POSTGRES_PORT", 5432)?;
        let postgres_user = env_or_default("POSTGRES_USER", "grader");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "essay_grader");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = env_number("REDIS_PORT", 6379)?;
        let redis_db = env_number("REDIS_DB", 0)?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let ocr_base_url = env_or_default("OCR_BASE_URL", "");
        let grading_base_url = env_or_default("GRADING_BASE_URL", "");
        let export_base_url = env_or_default("EXPORT_BASE_URL", "");
        let connect_timeout_seconds = env_number("REMOTE_CONNECT_TIMEOUT_SECONDS", 10)?;
        let request_timeout_seconds = env_number("REMOTE_REQUEST_TIMEOUT_SECONDS", 120)?;
        let env_header = env_optional("REMOTE_ENV_HEADER");

        let poll_interval_seconds = env_number("GRADING_POLL_INTERVAL_SECONDS", 30)?;
        let stale_timeout_seconds = env_number("GRADING_STALE_TIMEOUT_SECONDS", 1200)?;
        let lock_ttl_seconds = env_number("EVALUATE_LOCK_TTL_SECONDS", 30)?;
        let lock_max_ttl_seconds = env_number("EVALUATE_LOCK_MAX_TTL_SECONDS", 200)?;
        let relay_channel_capacity = env_number("RELAY_CHANNEL_CAPACITY", 100)?;

        let download_ttl_seconds = env_number("DOWNLOAD_CACHE_TTL_SECONDS", 3600)?;

        let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
        let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str, cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            remote: RemoteSettings {
                ocr_base_url,
                grading_base_url,
                export_base_url,
                connect_timeout_seconds,
                request_timeout_seconds,
                env_header,
            },
            grading: GradingSettings {
                poll_interval_seconds,
                stale_timeout_seconds,
                lock_ttl_seconds,
                lock_max_ttl_seconds,
                relay_channel_capacity,
            },
            cache: CacheSettings { download_ttl_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn remote(&self) -> &RemoteSettings {
        &self.remote
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn cache(&self) -> &CacheSettings {
        &self.cache
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("GRADING_POLL_INTERVAL_SECONDS", self.grading.poll_interval_seconds)?;
        require_positive("GRADING_STALE_TIMEOUT_SECONDS", self.grading.stale_timeout_seconds)?;
        require_positive("EVALUATE_LOCK_TTL_SECONDS", self.grading.lock_ttl_seconds)?;
        require_positive("RELAY_CHANNEL_CAPACITY", self.grading.relay_channel_capacity as u64)?;
        require_positive("DOWNLOAD_CACHE_TTL_SECONDS", self.cache.download_ttl_seconds)?;

        if self.grading.lock_max_ttl_seconds < self.grading.lock_ttl_seconds {
            return Err(ConfigError::InvalidValue {
                field: "EVALUATE_LOCK_MAX_TTL_SECONDS",
                value: self.grading.lock_max_ttl_seconds.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.remote.ocr_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OCR_BASE_URL"));
        }
        if self.remote.grading_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("GRADING_BASE_URL"));
        }
        if self.remote.export_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("EXPORT_BASE_URL"));
        }

        Ok(())
    }
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue { field, value: value.to_string() });
    }
    Ok(())
}
