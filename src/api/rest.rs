use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{CountryListOutputType, CountryStatsOutputType, CountryType, CurrenciesType, PaginationOutput, RegionCountType},
};

/***************** Countries list models *********************/

/**
 * Query parameters of the country list.
 */
#[derive(Debug, Deserialize)]
pub struct CountryListQuery {
    /**
     * Exact region to filter on.
     */
    pub region: Option<String>,
    /**
     * Substring to search for in common and official names.
     */
    pub search: Option<String>,
    /**
     * One-based page number or `last`.
     */
    pub page: Option<String>,
}

/**
 * Response structure for listing countries.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryListResponse {
    countries: Vec<CountryElement>,
    pagination: PaginationResponse,
    /**
     * Regions available for filtering.
     */
    regions: Vec<String>,
    /**
     * Region filter in effect. Empty when not filtering.
     */
    current_region: String,
    /**
     * Search term in effect. Empty when not searching.
     */
    current_search: String,
}

impl From<CountryListOutputType> for CountryListResponse {
    fn from(output: CountryListOutputType) -> Self {
        CountryListResponse {
            countries: output.countries.into_iter().map(CountryElement::from).collect(),
            pagination: PaginationResponse::from(output.pagination),
            regions: output.regions,
            current_region: output.filter.region.unwrap_or_default(),
            current_search: output.filter.search.unwrap_or_default(),
        }
    }
}

/***************** Country models *********************/

/**
 * Represents a country in the API.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryElement {
    cca3: String,
    cca2: String,
    /**
     * Human readable label, e.g. `France (FRA)`.
     */
    display_name: String,
    common_name: String,
    official_name: String,
    capital: Option<String>,
    region: String,
    subregion: Option<String>,
    population: i64,
    area: Option<Decimal>,
    flag_url: Option<String>,
    currencies: CurrenciesType,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<CountryType> for CountryElement {
    fn from(country: CountryType) -> Self {
        CountryElement {
            display_name: country.to_string(),
            cca3: country.cca3,
            cca2: country.cca2,
            common_name: country.common_name,
            official_name: country.official_name,
            capital: country.capital,
            region: country.region,
            subregion: country.subregion,
            population: country.population,
            area: country.area,
            flag_url: country.flag_url,
            currencies: country.currencies,
            created_at: country.created_at,
            updated_at: country.updated_at,
        }
    }
}

/***************** Statistics models *********************/

/**
 * Response structure for the country statistics.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryStatsResponse {
    total_countries: i64,
    top_population: Vec<CountryElement>,
    top_area: Vec<CountryElement>,
    region_distribution: Vec<RegionCountElement>,
}

impl From<CountryStatsOutputType> for CountryStatsResponse {
    fn from(output: CountryStatsOutputType) -> Self {
        CountryStatsResponse {
            total_countries: output.total_countries,
            top_population: output.top_population.into_iter().map(CountryElement::from).collect(),
            top_area: output.top_area.into_iter().map(CountryElement::from).collect(),
            region_distribution: output.region_distribution.into_iter().map(RegionCountElement::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegionCountElement {
    region: String,
    count: i64,
}

impl From<RegionCountType> for RegionCountElement {
    fn from(region_count: RegionCountType) -> Self {
        RegionCountElement { region: region_count.region, count: region_count.count }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }

    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::Validation => StatusCode::BAD_REQUEST,
        ErrorType::ConstraintViolation => StatusCode::CONFLICT,
        ErrorType::Transport | ErrorType::FetchExhausted => StatusCode::BAD_GATEWAY,
        ErrorType::Initialization | ErrorType::DatabaseError | ErrorType::Application => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::Initialization => 1001,
        ErrorType::Application => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::NotFound => 1004,
        ErrorType::Validation => 1005,
        ErrorType::ConstraintViolation => 1006,
        ErrorType::Transport => 1007,
        ErrorType::FetchExhausted => 1008,
    }
}

/***************** Common models *********************/

/**
 * Pagination response structure.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResponse {
    /**
     * The one-based number of the returned page.
     */
    pub page: i64,
    /**
     * The size of the page.
     */
    pub page_size: i64,
    /**
     * Number of countries matching the filter.
     */
    pub total_count: i64,
    pub num_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl From<PaginationOutput> for PaginationResponse {
    fn from(pagination_output: PaginationOutput) -> Self {
        PaginationResponse {
            page: pagination_output.page,
            page_size: pagination_output.page_size,
            total_count: pagination_output.total_count,
            num_pages: pagination_output.num_pages,
            has_next: pagination_output.has_next(),
            has_previous: pagination_output.has_previous(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApplicationError::new(ErrorType::NotFound, "Country XXX not found".to_string()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApplicationError::new(ErrorType::FetchExhausted, "".to_string()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApplicationError::new(ErrorType::DatabaseError, "".to_string()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_body() {
        let response = ApplicationError::new(ErrorType::Validation, "Value too long".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
