use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/**
 * REST Countries endpoint with the fields the importer reads.
 */
pub const DEFAULT_API_URL: &str = "https://restcountries.com/v3.1/all?fields=name,cca2,cca3,capital,region,subregion,population,area,flags,currencies";

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
    /**
     * What to run. Defaults to serving the catalog.
     */
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /**
     * Serve the catalog API.
     */
    Serve,
    /**
     * Import countries once and exit.
     */
    Import,
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Database configuration for the application.
     */
    pub database: Database,
    /**
     * Country importer configuration.
     */
    #[serde(default)]
    pub importer: ImporterConfig,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Whether to log the source file.
     */
    pub file: bool,
    /**
     * Path to the log file. Logs go to stdout when not set.
     */
    pub logfile: Option<String>,
    /**
     * Additional directives for logging configuration.
     */
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { target: true, thread_ids: true, thread_names: true, line_number: true, level: true, ansi: true, file: true, logfile: None, directives: vec![] }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /**
     * Type of the database (e.g., `PostgreSQL`).
     */
    pub db_type: DatabaseType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    /**
     * `PostgreSQL` database type.
     */
    #[serde(rename_all = "camelCase")]
    Postgresql {
        connection_string: String,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: u64,
        acquire_slow_threshold: u64,
        idle_timeout: u64,
        max_lifetime: u64,
        #[serde(default)]
        run_migrations: bool,
    },
    /**
     * In-process store. Contents are lost on exit.
     */
    Memory,
}

/**
 * Configuration of the country importer.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImporterConfig {
    /**
     * URL of the country source.
     */
    pub api_url: String,
    /**
     * Maximum number of fetch attempts.
     */
    pub max_attempts: u32,
    /**
     * Delay between failed fetch attempts in seconds.
     */
    pub retry_delay_secs: u64,
    /**
     * Timeout of a single fetch in seconds.
     */
    pub timeout_secs: u64,
    /**
     * Interval between scheduled imports while serving. No scheduled import when not set.
     */
    pub schedule_interval_secs: Option<u64>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        ImporterConfig { api_url: DEFAULT_API_URL.to_string(), max_attempts: 3, retry_delay_secs: 2, timeout_secs: 30, schedule_interval_secs: None }
    }
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: Option<u16>,
    /**
     * HTTPS configuration for the server.
     */
    pub https_config: Option<HttpsConfig>,
}

/**
 * Represents the HTTPS configuration for the server.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    /**
     * Port for the HTTPS server.
     */
    pub port: u16,
    /**
     * Path to the certificate file.
     */
    pub certificate_file: String,
    /**
     * Path to the private key file.
     */
    pub private_key_file: String,
}
