use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::Deserialize;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{CountryUpsertInputType, CurrenciesType},
};

pub const DEFAULT_USER_AGENT: &str = concat!("countries-catalog/", env!("CARGO_PKG_VERSION"));

/**
 * Source of the raw country snapshot.
 */
#[async_trait]
pub trait CountrySource: Send + Sync {
    /**
     * Fetches the body at `url`. Any transport failure, including a non-2xx status, is an error.
     */
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApplicationError>;
}

/**
 * HTTP implementation of `CountrySource`.
 */
#[derive(Debug)]
pub struct HttpCountrySource {
    client: Client,
}

impl HttpCountrySource {
    /**
     * Creates a new HTTP source.
     *
     * # Arguments
     * `timeout`: Timeout of a single request.
     *
     * # Returns
     * The source or an `Initialization` error if the HTTP client cannot be built.
     */
    pub fn new(timeout: Duration) -> Result<Self, ApplicationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create HTTP client: {err}")))?;
        Ok(HttpCountrySource { client })
    }
}

#[async_trait]
impl CountrySource for HttpCountrySource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApplicationError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(&err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(&err, url))?;
        let body = response.bytes().await.map_err(|err| convert_reqwest_error(&err, url))?;
        Ok(body.to_vec())
    }
}

fn convert_reqwest_error(error: &reqwest::Error, url: &str) -> ApplicationError {
    if let Some(status) = error.status() {
        return ApplicationError::new(ErrorType::Transport, format!("Request to {url} failed with status {status}"));
    }
    if error.is_timeout() {
        return ApplicationError::new(ErrorType::Transport, format!("Request to {url} timed out"));
    }
    ApplicationError::new(ErrorType::Transport, format!("Request to {url} failed: {error}"))
}

/***************** Upstream record models *********************/

/**
 * One country as delivered by REST Countries. Every field may be missing.
 */
#[derive(Debug, Default, Deserialize)]
pub struct CountryRecord {
    pub cca3: Option<String>,
    pub cca2: Option<String>,
    pub name: Option<CountryNameRecord>,
    /**
     * Candidate capitals. Only the first is kept.
     */
    pub capital: Option<Vec<String>>,
    pub region: Option<String>,
    pub subregion: Option<String>,
    pub population: Option<i64>,
    pub area: Option<f64>,
    pub flags: Option<FlagsRecord>,
    /**
     * Stored as is.
     */
    pub currencies: Option<CurrenciesType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountryNameRecord {
    pub common: Option<String>,
    pub official: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlagsRecord {
    pub png: Option<String>,
}

/**
 * Areas at or above this value have more than 13 integer digits.
 */
const MAX_AREA_EXCLUSIVE: i64 = 10_000_000_000_000;

/**
 * Fails with a `Validation` error if `value` has more than `max_length` characters.
 */
fn check_length(field: &str, value: &str, max_length: usize) -> Result<(), ApplicationError> {
    if value.chars().count() > max_length {
        return Err(ApplicationError::new(ErrorType::Validation, format!("Field {field} longer than {max_length} characters")));
    }
    Ok(())
}

/**
 * Fails with a `Validation` error if `area` does not fit `NUMERIC(15, 2)`.
 */
fn check_area(area: Option<Decimal>) -> Result<(), ApplicationError> {
    if let Some(area) = area {
        if area.abs() >= Decimal::new(MAX_AREA_EXCLUSIVE, 0) {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Field area {area} out of range")));
        }
    }
    Ok(())
}

/**
 * Normalizes an upstream record into the attributes stored for a country.
 */
impl TryFrom<CountryRecord> for CountryUpsertInputType {
    type Error = ApplicationError;

    fn try_from(record: CountryRecord) -> Result<Self, Self::Error> {
        let cca3 = record.cca3.filter(|cca3| !cca3.is_empty()).ok_or_else(|| ApplicationError::new(ErrorType::Validation, "Country without cca3".to_string()))?;
        let name = record.name.unwrap_or_default();
        let capital = record.capital.and_then(|capitals| capitals.into_iter().next());
        let flag_url = record.flags.and_then(|flags| flags.png).unwrap_or_default();
        let population = record.population.unwrap_or(0);
        if population < 0 {
            return Err(ApplicationError::new(ErrorType::Validation, format!("Negative population {population} for {cca3}")));
        }
        let area = match record.area {
            Some(area) => {
                let mut area = Decimal::from_f64(area).ok_or_else(|| ApplicationError::new(ErrorType::Validation, format!("Invalid area {area} for {cca3}")))?.round_dp(2);
                area.rescale(2);
                Some(area)
            }
            None => None,
        };
        let input = CountryUpsertInputType {
            cca2: record.cca2.unwrap_or_default(),
            common_name: name.common.unwrap_or_default(),
            official_name: name.official.unwrap_or_default(),
            capital,
            region: record.region.unwrap_or_default(),
            subregion: record.subregion,
            population,
            area,
            flag_url: Some(flag_url),
            currencies: record.currencies.unwrap_or_default(),
            cca3,
        };
        check_length("cca3", &input.cca3, 3)?;
        check_length("cca2", &input.cca2, 2)?;
        check_length("common_name", &input.common_name, 255)?;
        check_length("official_name", &input.official_name, 255)?;
        check_length("capital", input.capital.as_deref().unwrap_or_default(), 255)?;
        check_length("region", &input.region, 100)?;
        check_length("subregion", input.subregion.as_deref().unwrap_or_default(), 100)?;
        check_length("flag_url", input.flag_url.as_deref().unwrap_or_default(), 500)?;
        check_area(input.area)?;
        Ok(input)
    }
}
