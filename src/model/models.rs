use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Number of countries on one page of the country list.
 */
pub const PAGE_SIZE: i64 = 20;

/**
 * Number of countries in each of the top lists on the statistics view.
 */
pub const TOP_LIMIT: i64 = 10;

/**
 * Currency code to currency mapping, kept exactly as delivered upstream.
 */
pub type CurrenciesType = serde_json::Map<String, serde_json::Value>;

/**
 * A stored country.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CountryType {
    /**
     * Three letter country code. Natural key of the country.
     */
    pub cca3: String,
    /**
     * Two letter country code. Not unique.
     */
    pub cca2: String,
    pub common_name: String,
    pub official_name: String,
    pub capital: Option<String>,
    pub region: String,
    pub subregion: Option<String>,
    pub population: i64,
    /**
     * Area in square kilometers with two fraction digits.
     */
    pub area: Option<Decimal>,
    pub flag_url: Option<String>,
    pub currencies: CurrenciesType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CountryType {
    /**
     * Creates a new stored country from normalized attributes. Both timestamps are set to `now`.
     *
     * # Arguments
     * `input`: Normalized attributes of the country.
     * `now`: Creation time.
     *
     * # Returns
     * A new `CountryType`.
     */
    pub fn new(input: CountryUpsertInputType, now: DateTime<Utc>) -> Self {
        CountryType {
            cca3: input.cca3,
            cca2: input.cca2,
            common_name: input.common_name,
            official_name: input.official_name,
            capital: input.capital,
            region: input.region,
            subregion: input.subregion,
            population: input.population,
            area: input.area,
            flag_url: input.flag_url,
            currencies: input.currencies,
            created_at: now,
            updated_at: now,
        }
    }

    /**
     * Overwrites every normalized attribute and bumps `updated_at`. The natural key and `created_at` are kept.
     *
     * # Arguments
     * `input`: Normalized attributes of the country.
     * `now`: Update time.
     */
    pub fn apply(&mut self, input: CountryUpsertInputType, now: DateTime<Utc>) {
        self.cca2 = input.cca2;
        self.common_name = input.common_name;
        self.official_name = input.official_name;
        self.capital = input.capital;
        self.region = input.region;
        self.subregion = input.subregion;
        self.population = input.population;
        self.area = input.area;
        self.flag_url = input.flag_url;
        self.currencies = input.currencies;
        self.updated_at = now;
    }
}

impl fmt::Display for CountryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.common_name, self.cca3)
    }
}

/**
 * Normalized attributes written by the importer. Every attribute except `cca3` is overwritten on update.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CountryUpsertInputType {
    pub cca3: String,
    pub cca2: String,
    pub common_name: String,
    pub official_name: String,
    pub capital: Option<String>,
    pub region: String,
    pub subregion: Option<String>,
    pub population: i64,
    pub area: Option<Decimal>,
    pub flag_url: Option<String>,
    pub currencies: CurrenciesType,
}

/**
 * Outcome of a single upsert.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/**
 * Counters reported by a completed import.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: u32,
    pub updated: u32,
    pub errors: u32,
}

/**
 * Filter parameters for the country list. `None` means no filtering on that attribute.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryListInputType {
    /**
     * Exact region match.
     */
    pub region: Option<String>,
    /**
     * Case-insensitive substring matched against common or official name.
     */
    pub search: Option<String>,
}

impl CountryListInputType {
    /**
     * Creates filter parameters. Empty values are treated as absent.
     */
    pub fn new(region: Option<String>, search: Option<String>) -> Self {
        CountryListInputType { region: region.filter(|value| !value.is_empty()), search: search.filter(|value| !value.is_empty()) }
    }
}

/**
 * Requested page of a paginated list.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    /**
     * One-based page number.
     */
    Number(i64),
    Last,
}

/**
 * Pagination request for the country list.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationInput {
    pub page: PageSelector,
    pub page_size: i64,
}

impl PaginationInput {
    pub fn new(page: PageSelector) -> Self {
        PaginationInput { page, page_size: PAGE_SIZE }
    }

    /**
     * Parses the raw page query parameter. A missing parameter selects the first page.
     *
     * # Arguments
     * `page`: Raw value of the page parameter.
     *
     * # Returns
     * The pagination input or a `NotFound` error if the value is neither a number nor `last`.
     */
    pub fn parse(page: Option<&str>) -> Result<Self, ApplicationError> {
        let selector = match page.map(str::trim) {
            None | Some("") => PageSelector::Number(1),
            Some("last") => PageSelector::Last,
            Some(value) => PageSelector::Number(value.parse::<i64>().map_err(|_err| ApplicationError::new(ErrorType::NotFound, format!("Invalid page: {value}")))?),
        };
        Ok(PaginationInput::new(selector))
    }

    /**
     * Resolves the requested page against the number of matching rows.
     *
     * # Arguments
     * `total_count`: Number of rows matching the filter.
     *
     * # Returns
     * The resolved `PaginationOutput` or a `NotFound` error if the page is out of range.
     * The first page of an empty result is always valid.
     */
    pub fn resolve(&self, total_count: i64) -> Result<PaginationOutput, ApplicationError> {
        let num_pages = if total_count == 0 { 1 } else { (total_count + self.page_size - 1) / self.page_size };
        let page = match self.page {
            PageSelector::Last => num_pages,
            PageSelector::Number(number) => number,
        };
        if page < 1 || page > num_pages {
            return Err(ApplicationError::new(ErrorType::NotFound, format!("Page {page} out of range")));
        }
        Ok(PaginationOutput { page, page_size: self.page_size, total_count, num_pages })
    }
}

/**
 * Resolved pagination of a list result.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOutput {
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub num_pages: i64,
}

impl PaginationOutput {
    /**
     * Offset of the first row of this page.
     */
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/**
 * Result of the country list query.
 */
#[derive(Debug, Clone)]
pub struct CountryListOutputType {
    pub countries: Vec<CountryType>,
    pub pagination: PaginationOutput,
    /**
     * Distinct regions present in the store, sorted. Used to build a region filter.
     */
    pub regions: Vec<String>,
    /**
     * The filter that produced this result.
     */
    pub filter: CountryListInputType,
}

/**
 * Number of countries in a region.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCountType {
    pub region: String,
    pub count: i64,
}

/**
 * Result of the statistics query.
 */
#[derive(Debug, Clone)]
pub struct CountryStatsOutputType {
    pub total_countries: i64,
    pub top_population: Vec<CountryType>,
    pub top_area: Vec<CountryType>,
    pub region_distribution: Vec<RegionCountType>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_country_display() {
        let country = CountryType::new(
            CountryUpsertInputType {
                cca3: "FRA".to_string(),
                cca2: "FR".to_string(),
                common_name: "France".to_string(),
                official_name: "French Republic".to_string(),
                capital: Some("Paris".to_string()),
                region: "Europe".to_string(),
                subregion: Some("Western Europe".to_string()),
                population: 67_000_000,
                area: Some(Decimal::new(55_169_500, 2)),
                flag_url: None,
                currencies: CurrenciesType::new(),
            },
            Utc::now(),
        );
        assert_eq!(country.to_string(), "France (FRA)");
        assert_eq!(country.created_at, country.updated_at);
    }

    #[test]
    fn test_list_input_ignores_empty_values() {
        let input = CountryListInputType::new(Some(String::new()), Some(String::new()));
        assert_eq!(input, CountryListInputType::default());
        let input = CountryListInputType::new(Some("Europe".to_string()), None);
        assert_eq!(input.region.as_deref(), Some("Europe"));
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(PaginationInput::parse(None).unwrap().page, PageSelector::Number(1));
        assert_eq!(PaginationInput::parse(Some("3")).unwrap().page, PageSelector::Number(3));
        assert_eq!(PaginationInput::parse(Some("last")).unwrap().page, PageSelector::Last);
        assert_eq!(PaginationInput::parse(Some("abc")).unwrap_err().error_type, ErrorType::NotFound);
    }

    #[test]
    fn test_resolve_pagination() {
        let pagination = PaginationInput::new(PageSelector::Number(2)).resolve(45).unwrap();
        assert_eq!(pagination.num_pages, 3);
        assert_eq!(pagination.offset(), 20);
        assert!(pagination.has_next());
        assert!(pagination.has_previous());

        let last = PaginationInput::new(PageSelector::Last).resolve(45).unwrap();
        assert_eq!(last.page, 3);
        assert!(!last.has_next());
    }

    #[test]
    fn test_resolve_pagination_empty_first_page() {
        let pagination = PaginationInput::new(PageSelector::Number(1)).resolve(0).unwrap();
        assert_eq!(pagination.num_pages, 1);
        assert_eq!(pagination.offset(), 0);
        assert!(!pagination.has_next());
        assert!(!pagination.has_previous());
    }

    #[test]
    fn test_resolve_pagination_out_of_range() {
        assert_eq!(PaginationInput::new(PageSelector::Number(0)).resolve(10).unwrap_err().error_type, ErrorType::NotFound);
        assert_eq!(PaginationInput::new(PageSelector::Number(2)).resolve(20).unwrap_err().error_type, ErrorType::NotFound);
        assert!(PaginationInput::new(PageSelector::Number(2)).resolve(21).is_ok());
    }
}
