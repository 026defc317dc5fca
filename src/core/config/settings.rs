use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings, GenerationSettings,
    NotificationSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings,
};

const DEV_SECRET_KEY: &str = "examforge-dev-secret";
const MAX_SWEEP_INTERVAL_SECONDS: u64 = 600;
const MAX_MANUAL_IDS: u32 = 100;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMFORGE_HOST", "0.0.0.0");
        let port = env_or_default("EXAMFORGE_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMFORGE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAMFORGE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examforge API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => {
                if !strict_config {
                    tracing::warn!("SECRET_KEY is not set; using the development signing key");
                }
                DEV_SECRET_KEY.to_string()
            }
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "examforge");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "examforge");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let max_questions = parse_u32(
            "GENERATION_MAX_QUESTIONS",
            env_or_default("GENERATION_MAX_QUESTIONS", "200"),
        )?;
        let max_manual_ids = parse_u32(
            "GENERATION_MAX_MANUAL_IDS",
            env_or_default("GENERATION_MAX_MANUAL_IDS", "100"),
        )?;

        let sweep_interval_seconds = parse_u64(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "30"),
        )?;
        let sweep_batch_size = parse_u32(
            "EXPIRY_SWEEP_BATCH_SIZE",
            env_or_default("EXPIRY_SWEEP_BATCH_SIZE", "500"),
        )?;
        let stalled_grading_after_seconds = parse_u64(
            "STALLED_GRADING_AFTER_SECONDS",
            env_or_default("STALLED_GRADING_AFTER_SECONDS", "120"),
        )?;

        let notifications_enabled = env_optional("PROGRESS_NOTIFICATIONS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);
        let channel_prefix = env_or_default("PROGRESS_CHANNEL_PREFIX", "examforge:progress");

        let log_level = env_or_default("EXAMFORGE_LOG_LEVEL", "info");
        let json = env_optional("EXAMFORGE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
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
            generation: GenerationSettings { max_questions, max_manual_ids },
            attempts: AttemptSettings {
                sweep_interval_seconds,
                sweep_batch_size,
                stalled_grading_after_seconds,
            },
            notifications: NotificationSettings { enabled: notifications_enabled, channel_prefix },
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

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn generation(&self) -> &GenerationSettings {
        &self.generation
    }

    pub(crate) fn attempts(&self) -> &AttemptSettings {
        &self.attempts
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.attempts.sweep_interval_seconds;
        if interval == 0 || interval > MAX_SWEEP_INTERVAL_SECONDS {
            return Err(ConfigError::InvalidValue {
                field: "EXPIRY_SWEEP_INTERVAL_SECONDS",
                value: interval.to_string(),
            });
        }

        if self.attempts.sweep_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXPIRY_SWEEP_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        if self.generation.max_questions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GENERATION_MAX_QUESTIONS",
                value: "0".to_string(),
            });
        }

        let manual = self.generation.max_manual_ids;
        if manual == 0 || manual > MAX_MANUAL_IDS {
            return Err(ConfigError::InvalidValue {
                field: "GENERATION_MAX_MANUAL_IDS",
                value: manual.to_string(),
            });
        }

        if self.notifications.channel_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "PROGRESS_CHANNEL_PREFIX",
                value: String::from("<empty>"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.security.secret_key == DEV_SECRET_KEY {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
