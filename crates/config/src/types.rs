use serde::Deserialize;
use std::{collections::HashMap, env, str::FromStr};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub analytics: AnalyticsConfig,
    pub otlp: OtlpConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            store: StoreConfig::from_env()?,
            analytics: AnalyticsConfig::from_env()?,
            otlp: OtlpConfig::from_env()?,
        })
    }
}

/// Read an optional variable, falling back to `default` when unset.
/// A set but unparsable value is an error rather than a silent fallback.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
    /// Upper bound for a single aggregation query; exceeding it reports the store as unavailable
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "ecommerce_analytics".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            max_connections: 5,
            query_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// Create a connection URL for this database configuration
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or(defaults.host),
            port: env_or("DATABASE_PORT", defaults.port)?,
            database: env::var("DATABASE_NAME").unwrap_or(defaults.database),
            username: env::var("DATABASE_USERNAME").unwrap_or(defaults.username),
            password: env::var("DATABASE_PASSWORD").unwrap_or(defaults.password),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            query_timeout_secs: env_or("DATABASE_QUERY_TIMEOUT_SECS", defaults.query_timeout_secs)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by the CORS layer
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: env_or("SERVER_PORT", defaults.port)
                .map_err(|_| "SERVER_PORT must be a valid port number".to_string())?,
            frontend_url: env::var("FRONTEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
        })
    }
}

/// Which record store backs the analytics engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl StoreConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            backend: env_or("STORE_BACKEND", StoreBackend::default())?,
        })
    }
}

/// Analytics engine tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// How long an assembled report is served from cache
    pub cache_ttl_secs: u64,
    /// Products with stock at or below this count as low stock
    pub low_stock_threshold: i64,
    /// Products with exactly this stock count as out of stock
    pub out_of_stock_threshold: i64,
    /// Coalesce concurrent cache misses into a single assembly
    pub single_flight: bool,
    /// Serve cache hits with the same body shape as fresh computations
    pub normalize_cached_envelope: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            low_stock_threshold: 10,
            out_of_stock_threshold: 0,
            single_flight: false,
            normalize_cached_envelope: false,
        }
    }
}

impl AnalyticsConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            cache_ttl_secs: env_or("ANALYTICS_CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            low_stock_threshold: env_or(
                "ANALYTICS_LOW_STOCK_THRESHOLD",
                defaults.low_stock_threshold,
            )?,
            out_of_stock_threshold: env_or(
                "ANALYTICS_OUT_OF_STOCK_THRESHOLD",
                defaults.out_of_stock_threshold,
            )?,
            single_flight: env_or("ANALYTICS_SINGLE_FLIGHT", defaults.single_flight)?,
            normalize_cached_envelope: env_or(
                "ANALYTICS_NORMALIZE_CACHED_ENVELOPE",
                defaults.normalize_cached_envelope,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.out_of_stock_threshold > self.low_stock_threshold {
            return Err(format!(
                "ANALYTICS_OUT_OF_STOCK_THRESHOLD ({}) must not exceed ANALYTICS_LOW_STOCK_THRESHOLD ({})",
                self.out_of_stock_threshold, self.low_stock_threshold
            ));
        }
        if self.out_of_stock_threshold < 0 {
            return Err("ANALYTICS_OUT_OF_STOCK_THRESHOLD must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_DATABASE") {
            modules.insert("database".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }

    /// Filter directive understood by `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();

        let mut filter = self.level.clone();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

/// OpenTelemetry metrics export; disabled when no endpoint is configured
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OtlpConfig {
    pub endpoint: Option<String>,
    pub export_interval_secs: u64,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            export_interval_secs: 60,
        }
    }
}

impl OtlpConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            export_interval_secs: env_or("OTEL_METRIC_EXPORT_INTERVAL_SECS", 60)?,
        })
    }
}
