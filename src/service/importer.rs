use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, instrument};

use crate::{
    client::restcountries::{CountryRecord, CountrySource},
    dao::CountryStore,
    model::{
        apperror::{ApplicationError, ErrorType},
        config::ImporterConfig,
        models::{CountryUpsertInputType, ImportSummary, UpsertOutcome},
    },
};

/**
 * Waits between failed fetch attempts.
 */
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/**
 * Sleeper backed by the tokio timer.
 */
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/**
 * Imports the country snapshot into the store. Records are upserted by their three letter code.
 */
pub struct CountryImporter {
    /**
     * Where the snapshot is fetched from.
     */
    source: Arc<dyn CountrySource>,
    /**
     * Used to wait between failed attempts.
     */
    sleeper: Arc<dyn Sleeper>,
    /**
     * Store the countries are written to.
     */
    store: Arc<dyn CountryStore>,
    config: ImporterConfig,
}

impl CountryImporter {
    /**
     * Creates a new instance of `CountryImporter`.
     *
     * # Arguments
     * `source`: Source of the country snapshot.
     * `sleeper`: Waits between failed fetch attempts.
     * `store`: The country store.
     * `config`: Importer configuration with url, attempt budget and retry delay.
     *
     * # Returns
     * A new instance of `CountryImporter`.
     */
    pub fn new(source: Arc<dyn CountrySource>, sleeper: Arc<dyn Sleeper>, store: Arc<dyn CountryStore>, config: ImporterConfig) -> Self {
        CountryImporter { source, sleeper, store, config }
    }

    /**
     * Fetches the snapshot and reconciles every record into the store.
     *
     * Nothing is written unless a fetch attempt succeeds. A record that cannot be normalized or stored is counted as an error
     * and the remaining records are still processed.
     *
     * # Returns
     * The import counters, or a `FetchExhausted` error if every fetch attempt failed.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn import_all(&self) -> Result<ImportSummary, ApplicationError> {
        let span = tracing::Span::current();
        tracing::info!("Fetching countries from {}", self.config.api_url);
        let records = self.fetch_records().instrument(span.clone()).await?;
        tracing::info!("Received {} countries", records.len());

        let mut summary = ImportSummary::default();
        for record in records {
            let cca3 = record.get("cca3").and_then(Value::as_str).unwrap_or("unknown").to_string();
            match self.import_record(record).instrument(span.clone()).await {
                Ok(UpsertOutcome::Created) => summary.created += 1,
                Ok(UpsertOutcome::Updated) => summary.updated += 1,
                Err(err) => {
                    tracing::warn!("Error processing {}: {}", cca3, err);
                    summary.errors += 1;
                }
            }
        }
        tracing::info!(created = summary.created, updated = summary.updated, errors = summary.errors, "Import completed");
        Ok(summary)
    }

    /**
     * Fetches the snapshot with a bounded number of attempts, waiting the retry delay between failed attempts.
     *
     * # Returns
     * The raw records, or a `FetchExhausted` error when the attempt budget is used up.
     */
    async fn fetch_records(&self) -> Result<Vec<Value>, ApplicationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let retry_delay = Duration::from_secs(self.config.retry_delay_secs);
        for attempt in 1..=max_attempts {
            tracing::info!("Attempt {}/{}", attempt, max_attempts);
            match self.fetch_once().await {
                Ok(records) => {
                    tracing::info!("Request successful on attempt {}", attempt);
                    return Ok(records);
                }
                Err(err) => {
                    tracing::error!("Request failed: {}", err);
                    if attempt < max_attempts {
                        tracing::info!("Retrying in {} seconds", retry_delay.as_secs());
                        self.sleeper.sleep(retry_delay).await;
                    }
                }
            }
        }
        tracing::error!("All retry attempts failed. Aborting.");
        Err(ApplicationError::new(ErrorType::FetchExhausted, format!("All {max_attempts} attempts to fetch countries failed")))
    }

    /**
     * A single fetch attempt. A body that is not a JSON array fails the attempt.
     */
    async fn fetch_once(&self) -> Result<Vec<Value>, ApplicationError> {
        let body = self.source.fetch(&self.config.api_url).await?;
        serde_json::from_slice::<Vec<Value>>(&body).map_err(|err| ApplicationError::new(ErrorType::Transport, format!("Invalid response body: {err}")))
    }

    async fn import_record(&self, record: Value) -> Result<UpsertOutcome, ApplicationError> {
        let record: CountryRecord = serde_json::from_value(record).map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Malformed country record: {err}")))?;
        let input = CountryUpsertInputType::try_from(record)?;
        self.store.upsert(input).await
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::dao::memory::MemoryCountryStore;
    use crate::model::models::CountryListInputType;

    /**
     * Source answering from a queue of responses, then repeating `fallback`.
     */
    struct FakeSource {
        responses: Mutex<VecDeque<Result<Vec<u8>, ApplicationError>>>,
        fallback: Result<Vec<u8>, ApplicationError>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(responses: Vec<Result<Vec<u8>, ApplicationError>>, fallback: Result<Vec<u8>, ApplicationError>) -> Arc<Self> {
            Arc::new(FakeSource { responses: Mutex::new(responses.into()), fallback, calls: AtomicUsize::new(0) })
        }

        fn always(body: &Value) -> Arc<Self> {
            Self::new(vec![], Ok(body.to_string().into_bytes()))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CountrySource for FakeSource {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn network_error() -> ApplicationError {
        ApplicationError::new(ErrorType::Transport, "Network error".to_string())
    }

    fn france() -> Value {
        json!({
            "cca3": "FRA",
            "cca2": "FR",
            "name": {"common": "France", "official": "French Republic"},
            "capital": ["Paris"],
            "region": "Europe",
            "subregion": "Western Europe",
            "population": 67000000,
            "area": 551695,
            "flags": {"png": "https://example.com/flag.png"},
            "currencies": {"EUR": {"name": "Euro", "symbol": "€"}}
        })
    }

    fn importer(source: Arc<FakeSource>, sleeper: Arc<RecordingSleeper>, store: Arc<MemoryCountryStore>) -> CountryImporter {
        CountryImporter::new(source, sleeper, store, ImporterConfig::default())
    }

    async fn store_size(store: &MemoryCountryStore) -> i64 {
        store.count(&CountryListInputType::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_import_minimal_record_twice() {
        let store = Arc::new(MemoryCountryStore::new());
        let body = json!([{"cca3": "FRA", "name": {"common": "France"}, "capital": ["Paris"], "population": 67000000}]);
        let importer = importer(FakeSource::always(&body), Arc::new(RecordingSleeper::default()), store.clone());

        let first = importer.import_all().await.unwrap();
        assert_eq!(first, ImportSummary { created: 1, updated: 0, errors: 0 });
        let country = store.find_by_cca3("FRA").await.unwrap().unwrap();
        assert_eq!(country.capital.as_deref(), Some("Paris"));
        assert_eq!(country.common_name, "France");

        let second = importer.import_all().await.unwrap();
        assert_eq!(second, ImportSummary { created: 0, updated: 1, errors: 0 });
        assert_eq!(store_size(&store).await, 1);
    }

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let store = Arc::new(MemoryCountryStore::new());
        let body = json!([
            france(),
            {"cca3": "DEU", "name": {"common": "Germany", "official": "Federal Republic of Germany"}, "region": "Europe", "population": 83000000},
            {"cca3": "USA", "name": {"common": "United States", "official": "United States of America"}, "region": "Americas", "population": 331000000}
        ]);
        let importer = importer(FakeSource::always(&body), Arc::new(RecordingSleeper::default()), store.clone());

        let first = importer.import_all().await.unwrap();
        assert_eq!(store_size(&store).await, 3);
        let second = importer.import_all().await.unwrap();
        assert_eq!(store_size(&store).await, 3);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, first.created);
    }

    #[tokio::test]
    async fn test_import_overwrites_existing_attributes() {
        let store = Arc::new(MemoryCountryStore::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        importer(FakeSource::always(&json!([france()])), sleeper.clone(), store.clone()).import_all().await.unwrap();
        let created_at = store.find_by_cca3("FRA").await.unwrap().unwrap().created_at;

        let renamed = json!([{"cca3": "FRA", "name": {"common": "République française"}, "population": 68000000}]);
        importer(FakeSource::always(&renamed), sleeper, store.clone()).import_all().await.unwrap();
        let country = store.find_by_cca3("FRA").await.unwrap().unwrap();
        assert_eq!(country.common_name, "République française");
        assert_eq!(country.population, 68_000_000);
        assert!(country.capital.is_none());
        assert!(country.currencies.is_empty());
        assert_eq!(country.created_at, created_at);
    }

    #[tokio::test]
    async fn test_import_retries_then_succeeds() {
        for failures in 1..3 {
            let store = Arc::new(MemoryCountryStore::new());
            let sleeper = Arc::new(RecordingSleeper::default());
            let source = FakeSource::new((0..failures).map(|_| Err(network_error())).collect(), Ok(json!([france()]).to_string().into_bytes()));
            let summary = importer(source.clone(), sleeper.clone(), store.clone()).import_all().await.unwrap();

            assert_eq!(source.calls(), failures + 1);
            assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2); failures]);
            assert_eq!(summary.created, 1);
            assert_eq!(store_size(&store).await, 1);
        }
    }

    #[tokio::test]
    async fn test_import_all_retries_fail() {
        let store = Arc::new(MemoryCountryStore::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let source = FakeSource::new(vec![], Err(network_error()));
        let result = importer(source.clone(), sleeper.clone(), store.clone()).import_all().await;

        assert_eq!(result.unwrap_err().error_type, ErrorType::FetchExhausted);
        assert_eq!(source.calls(), 3);
        assert_eq!(sleeper.sleeps().len(), 2);
        assert_eq!(store_size(&store).await, 0);
    }

    #[tokio::test]
    async fn test_import_invalid_body_counts_as_failed_attempt() {
        let store = Arc::new(MemoryCountryStore::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let source = FakeSource::new(vec![Ok(b"<html>maintenance</html>".to_vec()), Ok(b"{\"status\": 404}".to_vec())], Ok(json!([france()]).to_string().into_bytes()));
        let summary = importer(source.clone(), sleeper.clone(), store.clone()).import_all().await.unwrap();

        assert_eq!(source.calls(), 3);
        assert_eq!(sleeper.sleeps().len(), 2);
        assert_eq!(summary.created, 1);
    }

    #[tokio::test]
    async fn test_import_counts_record_errors_and_continues() {
        let store = Arc::new(MemoryCountryStore::new());
        let body = json!([
            {"name": {"common": "Nowhere"}},
            42,
            {"cca3": "NEG", "population": -5},
            {"cca3": "BAD", "capital": "not a list"},
            france()
        ]);
        let summary = importer(FakeSource::always(&body), Arc::new(RecordingSleeper::default()), store.clone()).import_all().await.unwrap();

        assert_eq!(summary, ImportSummary { created: 1, updated: 0, errors: 4 });
        assert_eq!(store_size(&store).await, 1);
        assert!(store.find_by_cca3("FRA").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_empty_snapshot() {
        let store = Arc::new(MemoryCountryStore::new());
        let summary = importer(FakeSource::always(&json!([])), Arc::new(RecordingSleeper::default()), store.clone()).import_all().await.unwrap();
        assert_eq!(summary, ImportSummary::default());
    }
}
