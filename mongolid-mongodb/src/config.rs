//! MongoDB connection configuration.

use std::env;
use std::time::Duration;

use mongodb::options::{Acknowledgment, ClientOptions};
use mongolid_core::WriteConcern;

use crate::error::{MongoError, MongoResult};

/// Default connection URI.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// MongoDB connection configuration.
///
/// Options left unset keep whatever the URI says.
#[derive(Debug, Clone, PartialEq)]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Default write concern of every collection.
    pub write_concern: Option<WriteConcern>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: String::new(),
            app_name: Some("mongolid".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            connect_timeout: Some(Duration::from_secs(10)),
            write_concern: None,
            direct_connection: None,
        }
    }
}

/// Convert a write concern to the driver's representation.
pub fn to_driver_write_concern(write_concern: &WriteConcern) -> mongodb::options::WriteConcern {
    let w = match write_concern {
        WriteConcern::W(n) => Acknowledgment::Nodes(*n),
        WriteConcern::Majority => Acknowledgment::Majority,
        WriteConcern::Custom(tag) => Acknowledgment::Custom(tag.clone()),
    };
    mongodb::options::WriteConcern::builder().w(w).build()
}

impl MongoConfig {
    /// Create a new configuration from a MongoDB URI.
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Configuration from `MONGODB_URI` (default `mongodb://localhost:27017`),
    /// `MONGODB_DATABASE` (required) and `MONGODB_APP_NAME`.
    pub fn from_env() -> MongoResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> MongoResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(uri) = lookup("MONGODB_URI") {
            builder = builder.uri(uri);
        }
        if let Some(database) = lookup("MONGODB_DATABASE") {
            builder = builder.database(database);
        }
        if let Some(app_name) = lookup("MONGODB_APP_NAME") {
            builder = builder.app_name(app_name);
        }
        builder.build()
    }

    /// Parse the URI and lay the configured options over it.
    pub async fn to_client_options(&self) -> MongoResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| MongoError::config(format!("failed to parse URI: {}", e)))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name.clone();
        }
        options.min_pool_size = self.min_pool_size.or(options.min_pool_size);
        options.max_pool_size = self.max_pool_size.or(options.max_pool_size);
        options.connect_timeout = self.connect_timeout.or(options.connect_timeout);
        options.direct_connection = self.direct_connection.or(options.direct_connection);
        if let Some(write_concern) = &self.write_concern {
            options.write_concern = Some(to_driver_write_concern(write_concern));
        }

        Ok(options)
    }
}

/// Builder for MongoDB configuration.
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    config: MongoConfig,
}

impl MongoConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.config.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.config.max_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = Some(duration);
        self
    }

    /// Set the default write concern. `WriteConcern::W(0)` makes every
    /// write unacknowledged, so every write reports failure.
    pub fn write_concern(mut self, wc: WriteConcern) -> Self {
        self.config.write_concern = Some(wc);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.config.direct_connection = Some(enabled);
        self
    }

    /// Build the configuration. The database name is required.
    pub fn build(self) -> MongoResult<MongoConfig> {
        if self.config.database.is_empty() {
            return Err(MongoError::config("database name is required"));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_uri() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", "mydb");
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.database, "mydb");
        assert_eq!(config.max_pool_size, Some(10));
    }

    #[test]
    fn test_config_builder_missing_database() {
        let result = MongoConfig::builder().uri("mongodb://localhost:27017").build();
        assert!(result.is_err());

        let result = MongoConfig::builder().database("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            [("MONGODB_URI", "mongodb://db:27017"), ("MONGODB_DATABASE", "app")].into();
        let config = MongoConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.uri, "mongodb://db:27017");
        assert_eq!(config.database, "app");
        assert_eq!(config.app_name, Some("mongolid".to_string()));

        assert!(MongoConfig::from_lookup(|_| None).is_err());
    }

    #[tokio::test]
    async fn test_builder_options_reach_client_options() {
        let config = MongoConfig::builder()
            .uri("mongodb://localhost:27017")
            .database("shop")
            .app_name("shop-api")
            .min_pool_size(2)
            .max_pool_size(20)
            .connect_timeout(Duration::from_secs(3))
            .write_concern(WriteConcern::Majority)
            .direct_connection(true)
            .build()
            .unwrap();

        let options = config.to_client_options().await.unwrap();
        assert_eq!(options.app_name.as_deref(), Some("shop-api"));
        assert_eq!(options.min_pool_size, Some(2));
        assert_eq!(options.max_pool_size, Some(20));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(
            options.write_concern.and_then(|wc| wc.w),
            Some(Acknowledgment::Majority)
        );
    }

    #[tokio::test]
    async fn test_uri_options_survive_unset_fields() {
        let mut config = MongoConfig::from_uri("mongodb://localhost:27017/?maxPoolSize=50", "shop");
        config.max_pool_size = None;

        let options = config.to_client_options().await.unwrap();
        assert_eq!(options.max_pool_size, Some(50));
        assert!(options.write_concern.is_none());
    }

    #[tokio::test]
    async fn test_invalid_uri_is_a_config_error() {
        let config = MongoConfig::from_uri("not a uri", "shop");
        let err = config.to_client_options().await.unwrap_err();
        assert!(matches!(err, MongoError::Config(_)));
    }

    #[test]
    fn test_write_concern_conversion() {
        let driver = to_driver_write_concern(&WriteConcern::W(0));
        assert_eq!(driver.w, Some(Acknowledgment::Nodes(0)));

        let driver = to_driver_write_concern(&WriteConcern::Custom("dc".into()));
        assert_eq!(driver.w, Some(Acknowledgment::Custom("dc".into())));
    }
}
