use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broker, the store catalog and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub stores: StoreSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to and how often idle
/// event streams receive a keep-alive comment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

/// Configuration settings for the broker.
///
/// `channel_capacity` bounds the frames buffered per connection; a subscriber
/// whose buffer is full is treated as gone. `publish_interval_secs = 0`
/// disables periodic snapshots.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub channel_capacity: usize,
    pub lock_timeout_ms: u64,
    pub publish_interval_secs: u64,
    pub idle_grace_secs: u64,
}

/// Shape of the in-memory store catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub count: u32,
    pub tables_per_store: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub stores: Option<PartialStoreSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub lock_timeout_ms: Option<u64>,
    pub publish_interval_secs: Option<u64>,
    pub idle_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStoreSettings {
    pub count: Option<u32>,
    pub tables_per_store: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
                keep_alive_secs: 15,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                channel_capacity: 64,
                lock_timeout_ms: 250,
                publish_interval_secs: 10,
                idle_grace_secs: 30,
            },
            stores: StoreSettings {
                count: 600,
                tables_per_store: 50,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
