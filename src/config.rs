use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Emit CORS headers for origins in `allowed_origins`.
    pub cross_origin: bool,
    /// Allowed origins; `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

/// Connection parameters handed to the query worker on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

/// Location of the worker runtime and its scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub program: String,
    pub query_script: PathBuf,
    pub file_script: PathBuf,
    pub working_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9123,
            cross_origin: false,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "lightcore".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            query_script: PathBuf::from("node-scripts/mysql/query-executor.js"),
            file_script: PathBuf::from("node-scripts/file-handler/file-executor.js"),
            working_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("lightcore")
    }

    /// Load configuration with an explicit config file base name.
    ///
    /// The file is optional; any format the `config` crate recognises by
    /// extension is accepted. `LIGHTCORE_*` variables override both the
    /// defaults and the file, with `__` separating nested keys
    /// (`LIGHTCORE_SERVER__PORT=8080`).
    pub fn load_from(file: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(
            config::File::from(file.as_ref()).required(false),
        );

        config = config.add_source(
            config::Environment::with_prefix("LIGHTCORE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.allowed_origins")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}
