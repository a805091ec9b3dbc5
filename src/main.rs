mod api;
mod client;
mod dao;
mod model;
mod service;
#[cfg(test)]
mod test_support;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, thread};

use crate::api::endpoints::{country_detail, country_list, country_stats};
use crate::api::middleware::timing_middleware;
use crate::api::state::AppState;
use crate::client::restcountries::HttpCountrySource;
use crate::dao::countries::CountryDao;
use crate::dao::memory::MemoryCountryStore;
use crate::dao::CountryStore;
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{ApplicationArguments, Command, DatabaseType, HttpsConfig, LoggingConfig};
use crate::model::models::ImportSummary;
use crate::service::countries::CountryService;
use crate::service::importer::{CountryImporter, TokioSleeper};

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::{IntCounter, IntGauge};
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sqlx::{Pool, Postgres, pool};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/**
 * Entry point. Serves the catalog or runs a single import depending on the subcommand.
 */
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_tracing(&config.logging)?;

    let (store, connection_pool): (Arc<dyn CountryStore>, Option<Arc<Pool<Postgres>>>) = match config.clone().database.db_type {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, acquire_slow_threshold, idle_timeout, max_lifetime, run_migrations } => {
            let connection_pool: Pool<Postgres> = pool::PoolOptions::new()
                .max_connections(max_connections)
                .min_connections(min_connections)
                .acquire_timeout(std::time::Duration::from_millis(acquire_timeout))
                .acquire_slow_threshold(std::time::Duration::from_millis(acquire_slow_threshold))
                .idle_timeout(std::time::Duration::from_millis(idle_timeout))
                .max_lifetime(std::time::Duration::from_millis(max_lifetime))
                .connect(connection_string.as_str())
                .await
                .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?;
            if run_migrations {
                sqlx::migrate!("./sqlx-postgresql-migration/migrations").run(&connection_pool).await.map_err(|err| std::io::Error::other(format!("Failed to run database migrations: {err}")))?;
            }
            (Arc::new(CountryDao::new(connection_pool.clone())), Some(Arc::new(connection_pool)))
        }
        DatabaseType::Memory => {
            tracing::warn!("Using in-memory country store, imported countries are lost on exit");
            (Arc::new(MemoryCountryStore::new()), None)
        }
    };

    let source = HttpCountrySource::new(Duration::from_secs(config.importer.timeout_secs)).map_err(|err| std::io::Error::other(format!("Failed to create country source: {err}")))?;
    let importer = Arc::new(CountryImporter::new(Arc::new(source), Arc::new(TokioSleeper), store.clone(), config.importer.clone()));

    if args.command == Some(Command::Import) {
        let summary = importer.import_all().await.map_err(|err| std::io::Error::other(format!("Import failed: {err}")))?;
        println!("Import completed:\n  - Created: {}\n  - Updated: {}\n  - Errors: {}", summary.created, summary.updated, summary.errors);
        return Ok(());
    }

    let country_service = CountryService::new(store);
    let state = web::Data::new(AppState::new(country_service));

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    if let Some(connection_pool) = connection_pool {
        let max_connections_gauge = IntGauge::new("max_connections", "Connection pool maximum").map_err(|err| std::io::Error::other(format!("Failed to create max_connections gauge: {err}")))?;
        let min_connections_gauge = IntGauge::new("min_connections", "Connection pool minimum").map_err(|err| std::io::Error::other(format!("Failed to create min_connections gauge: {err}")))?;
        let active_connections_gauge = IntGauge::new("active_connections", "Connection pool active").map_err(|err| std::io::Error::other(format!("Failed to create active_connections gauge: {err}")))?;
        let idle_connections_gauge = IntGauge::new("idle_connections", "Connection pool idle").map_err(|err| std::io::Error::other(format!("Failed to create idle_connections gauge: {err}")))?;
        register_prometheus_metric(&prometheus, Box::new(max_connections_gauge.clone()))?;
        register_prometheus_metric(&prometheus, Box::new(min_connections_gauge.clone()))?;
        register_prometheus_metric(&prometheus, Box::new(active_connections_gauge.clone()))?;
        register_prometheus_metric(&prometheus, Box::new(idle_connections_gauge.clone()))?;
        gather_db_metrics(max_connections_gauge, min_connections_gauge, active_connections_gauge, idle_connections_gauge, connection_pool);
    }

    if let Some(interval_secs) = config.importer.schedule_interval_secs {
        let import_metrics = ImportMetrics::new()?;
        import_metrics.register(&prometheus)?;
        schedule_imports(importer, Duration::from_secs(interval_secs.max(1)), import_metrics);
    }

    let server_init = HttpServer::new(move || {
        App::new()
            .wrap(prometheus.clone())
            .wrap(from_fn(timing_middleware))
            .app_data(state.clone())
            .service(country_list)
            .service(country_detail)
            .service(country_stats)
    });

    let server_init = if let Some(http_port) = &config.server.http_port { server_init.bind(("127.0.0.1", *http_port))? } else { server_init };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        server_init.bind_rustls_0_23("127.0.0.1:".to_string() + &https_config.port.to_string(), ssl_builder).map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    server_init.workers(config.server.workers).run().await
}

/**
 * Initializes structured logging for the application.
 *
 * #Arguments
 * `logging`: The logging configuration. `RUST_LOG` is honored, the configured directives are added on top.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in &logging.directives {
        let directive: Directive = directive.parse().map_err(|err| std::io::Error::other(format!("Invalid logging directive {directive}: {err}")))?;
        env_filter = env_filter.add_directive(directive);
    }
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi)
        .with_file(logging.file);
    let result = match &logging.logfile {
        Some(logfile) => {
            let file = fs::OpenOptions::new().create(true).append(true).open(logfile).map_err(|err| std::io::Error::other(format!("Failed to open log file {logfile}: {err}")))?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        None => builder.try_init(),
    };
    result.map_err(|err| std::io::Error::other(format!("Failed to initialize logging: {err}")))
}

/**
 * Registers a custom Prometheus metric.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the metric with.
 * `metric`: The metric to register.
 */
fn register_prometheus_metric(prometheus_metrics: &PrometheusMetrics, metric: Box<dyn prometheus::core::Collector>) -> Result<(), std::io::Error> {
    prometheus_metrics.registry.register(metric).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus metric: {err}")))?;
    Ok(())
}

/**
 * Gathers database metrics in a separate thread.
 *
 * #Arguments
 * `max_connections_gauge`: Gauge for maximum connections.
 * `min_connections_gauge`: Gauge for minimum connections.
 * `active_connections_gauge`: Gauge for active connections.
 * `idle_connections_gauge`: Gauge for idle connections.
 * `connection_pool`: The connection pool to gather metrics from.
 */
fn gather_db_metrics(max_connections_gauge: IntGauge, min_connections_gauge: IntGauge, active_connections_gauge: IntGauge, idle_connections_gauge: IntGauge, connection_pool: Arc<Pool<Postgres>>) {
    thread::spawn(move || {
        loop {
            max_connections_gauge.set(i64::from(connection_pool.options().get_max_connections()));
            min_connections_gauge.set(i64::from(connection_pool.options().get_min_connections()));
            active_connections_gauge.set(i64::from(connection_pool.size()));
            #[allow(clippy::cast_possible_wrap)]
            idle_connections_gauge.set(connection_pool.num_idle() as i64);
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/**
 * Outcome metrics of scheduled imports.
 */
struct ImportMetrics {
    created: IntGauge,
    updated: IntGauge,
    errors: IntGauge,
    failures: IntCounter,
}

impl ImportMetrics {
    fn new() -> Result<Self, std::io::Error> {
        Ok(ImportMetrics {
            created: IntGauge::new("last_import_created", "Countries created by the last import").map_err(|err| std::io::Error::other(format!("Failed to create last_import_created gauge: {err}")))?,
            updated: IntGauge::new("last_import_updated", "Countries updated by the last import").map_err(|err| std::io::Error::other(format!("Failed to create last_import_updated gauge: {err}")))?,
            errors: IntGauge::new("last_import_errors", "Records rejected by the last import").map_err(|err| std::io::Error::other(format!("Failed to create last_import_errors gauge: {err}")))?,
            failures: IntCounter::new("import_failures_total", "Imports aborted because the country source was unavailable").map_err(|err| std::io::Error::other(format!("Failed to create import_failures_total counter: {err}")))?,
        })
    }

    fn register(&self, prometheus_metrics: &PrometheusMetrics) -> Result<(), std::io::Error> {
        register_prometheus_metric(prometheus_metrics, Box::new(self.created.clone()))?;
        register_prometheus_metric(prometheus_metrics, Box::new(self.updated.clone()))?;
        register_prometheus_metric(prometheus_metrics, Box::new(self.errors.clone()))?;
        register_prometheus_metric(prometheus_metrics, Box::new(self.failures.clone()))
    }

    fn record(&self, result: &Result<ImportSummary, ApplicationError>) {
        match result {
            Ok(summary) => {
                self.created.set(i64::from(summary.created));
                self.updated.set(i64::from(summary.updated));
                self.errors.set(i64::from(summary.errors));
            }
            Err(_) => self.failures.inc(),
        }
    }
}

/**
 * Runs the importer immediately and then once per interval.
 *
 * #Arguments
 * `importer`: The country importer.
 * `interval`: Time between the start of two imports.
 * `import_metrics`: Metrics updated after every import.
 */
fn schedule_imports(importer: Arc<CountryImporter>, interval: Duration, import_metrics: ImportMetrics) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = importer.import_all().await;
            import_metrics.record(&result);
            match result {
                Ok(summary) => tracing::info!("Scheduled import completed: created {}, updated {}, errors {}", summary.created, summary.updated, summary.errors),
                Err(err) => tracing::error!("Scheduled import failed: {}", err),
            }
        }
    });
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let key = pkcs8_private_keys(key_file)
        .map(|key| key.map(PrivateKeyDer::Pkcs8))
        .next()
        .ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "No private key found".to_string()))?
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    let config = config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))?;
    Ok(config)
}

/**
 * Returns the supported TLS protocol versions.
 *
 * #Returns
 * A vector of supported protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<model::config::Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: model::config::Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}
