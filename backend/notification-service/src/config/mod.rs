use anyhow::{bail, Context};
use event_schema::{NOTIFICATION_CONSUMER_GROUP, TASK_NOTIFICATIONS_TOPIC};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma separated bootstrap servers
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Upper bound on a single publish, after which the broker counts as unavailable
    pub publish_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka:9092".to_string(),
            topic: TASK_NOTIFICATIONS_TOPIC.to_string(),
            group_id: NOTIFICATION_CONSUMER_GROUP.to_string(),
            publish_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Load configuration from the environment (after an optional `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let kafka_defaults = KafkaConfig::default();

        let config = Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8084".to_string())
                    .parse()
                    .context("APP_PORT must be a port number")?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("DATABASE_MAX_CONNECTIONS must be a number")?,
            },
            kafka: KafkaConfig {
                brokers: std::env::var("KAFKA_BROKERS").unwrap_or(kafka_defaults.brokers),
                topic: std::env::var("KAFKA_TOPIC").unwrap_or(kafka_defaults.topic),
                group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(kafka_defaults.group_id),
                publish_timeout_ms: std::env::var("KAFKA_PUBLISH_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(kafka_defaults.publish_timeout_ms),
            },
        };

        if config.kafka.brokers.trim().is_empty() {
            bail!("KAFKA_BROKERS must not be empty");
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}
