use std::borrow::Cow;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row, types::Json};
use tracing::{Instrument, instrument};

use crate::{
    dao::CountryStore,
    model::{
        apperror::{ApplicationError, ErrorType},
        db::{CountryRow, QueryRegionCountDbResp},
        models::{CountryListInputType, CountryType, CountryUpsertInputType, RegionCountType, UpsertOutcome},
    },
};

/**
 * Columns selected for a country row.
 */
const COUNTRY_COLUMNS: &str = "cca3, cca2, common_name, official_name, capital, region, subregion, population, area, flag_url, currencies, created_at, updated_at";

/**
 * SQL query to create or update a country. `xmax` is zero only for freshly inserted rows.
 */
const UPSERT_COUNTRY: &str = "INSERT INTO country (cca3, cca2, common_name, official_name, capital, region, subregion, population, area, flag_url, currencies, created_at, updated_at)
                              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now())
                              ON CONFLICT (cca3) DO UPDATE SET
                                cca2 = EXCLUDED.cca2, common_name = EXCLUDED.common_name, official_name = EXCLUDED.official_name,
                                capital = EXCLUDED.capital, region = EXCLUDED.region, subregion = EXCLUDED.subregion,
                                population = EXCLUDED.population, area = EXCLUDED.area, flag_url = EXCLUDED.flag_url,
                                currencies = EXCLUDED.currencies, updated_at = now()
                              RETURNING (xmax = 0) AS inserted";

/**
 * SQL query to add a new country.
 */
const ADD_COUNTRY: &str = "INSERT INTO country (cca3, cca2, common_name, official_name, capital, region, subregion, population, area, flag_url, currencies, created_at, updated_at)
                           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now())";

/**
 * Filter shared by the list and count queries. `$1` is the region, `$2` the LIKE pattern of the search term.
 */
const COUNTRY_FILTER: &str = "($1::text IS NULL OR region = $1) AND ($2::text IS NULL OR common_name ILIKE $2 OR official_name ILIKE $2)";

/**
 * SQL query to retrieve the distinct regions.
 */
const QUERY_DISTINCT_REGIONS: &str = "SELECT DISTINCT region FROM country ORDER BY region";

/**
 * SQL query to count countries per region.
 */
const QUERY_REGION_DISTRIBUTION: &str = "SELECT region, COUNT(cca3) AS count FROM country GROUP BY region ORDER BY count DESC, region";

/**
 * Postgres implementation of `CountryStore`.
 */
pub struct CountryDao {
    connection_pool: Pool<Postgres>,
}

impl CountryDao {
    /**
     * Creates a new instance of `CountryDao`.
     *
     * # Arguments
     * `connection_pool`: The database connection pool.
     *
     * # Returns
     * A new instance of `CountryDao`.
     */
    pub fn new(connection_pool: Pool<Postgres>) -> Self {
        CountryDao { connection_pool }
    }

    /**
     * Builds a LIKE pattern matching the search term anywhere. Wildcards in the term match literally.
     *
     * # Arguments
     * `search`: The search term.
     *
     * # Returns
     * The pattern to bind to an ILIKE comparison.
     */
    fn search_pattern(search: &str) -> String {
        let mut pattern = String::with_capacity(search.len() + 2);
        pattern.push('%');
        for character in search.chars() {
            if matches!(character, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(character);
        }
        pattern.push('%');
        pattern
    }

    /**
     * Handles database errors and maps them to application errors.
     *
     * # Arguments
     * `error`: The database error to handle.
     *
     * # Returns
     * An `ApplicationError` corresponding to the database error.
     */
    fn handle_database_error(error: &sqlx::Error) -> ApplicationError {
        if let Some(db_error) = error.as_database_error() {
            tracing::debug!("Database error: {}", db_error);
            if db_error.code() == Some(Cow::Borrowed("23505")) {
                // Unique violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("23514")) {
                // Check violation
                return ApplicationError::new(ErrorType::Validation, format!("Invalid value: {db_error}"));
            } else if db_error.code() == Some(Cow::Borrowed("22001")) || db_error.code() == Some(Cow::Borrowed("22003")) {
                // Value too long or numeric overflow
                return ApplicationError::new(ErrorType::Validation, "Value too long".to_string());
            }
            tracing::error!("Unhandled database error: {}", db_error);
            return ApplicationError::new(ErrorType::DatabaseError, "Unhandled database error".to_string());
        }
        ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute database operation: {error}"))
    }

    /**
     * Builds an insert or upsert statement with every attribute of the country bound in column order.
     */
    fn bind_country<'q>(query: &'q str, input: CountryUpsertInputType) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        sqlx::query(query)
            .bind(input.cca3)
            .bind(input.cca2)
            .bind(input.common_name)
            .bind(input.official_name)
            .bind(input.capital)
            .bind(input.region)
            .bind(input.subregion)
            .bind(input.population)
            .bind(input.area)
            .bind(input.flag_url)
            .bind(Json(input.currencies))
    }
}

#[async_trait]
impl CountryStore for CountryDao {
    #[instrument(skip(self, input), fields(cca3 = %input.cca3, result))]
    async fn upsert(&self, input: CountryUpsertInputType) -> Result<UpsertOutcome, ApplicationError> {
        let span = tracing::Span::current();
        let row = Self::bind_country(UPSERT_COUNTRY, input)
            .fetch_one(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(&err))?;
        let inserted: bool = row.try_get("inserted").map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to read upsert result: {err}")))?;
        Ok(if inserted { UpsertOutcome::Created } else { UpsertOutcome::Updated })
    }

    #[instrument(skip(self, input), fields(cca3 = %input.cca3, result))]
    async fn insert(&self, input: CountryUpsertInputType) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        Self::bind_country(ADD_COUNTRY, input)
            .execute(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(&err))?;
        Ok(())
    }

    #[instrument(skip(self), fields(result))]
    async fn find_by_cca3(&self, cca3: &str) -> Result<Option<CountryType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("SELECT {COUNTRY_COLUMNS} FROM country WHERE cca3 = $1");
        let row: Option<CountryRow> = sqlx::query_as(&query)
            .bind(cca3)
            .fetch_optional(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get country: {err}")))?;
        Ok(row.map(CountryType::from))
    }

    #[instrument(skip(self), fields(result))]
    async fn count(&self, filter: &CountryListInputType) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("SELECT COUNT(*) FROM country WHERE {COUNTRY_FILTER}");
        let result: (i64,) = sqlx::query_as(&query)
            .bind(filter.region.as_deref())
            .bind(filter.search.as_deref().map(Self::search_pattern))
            .fetch_one(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count countries: {err}")))?;
        Ok(result.0)
    }

    #[instrument(skip(self), fields(result))]
    async fn list(&self, filter: &CountryListInputType, limit: i64, offset: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("SELECT {COUNTRY_COLUMNS} FROM country WHERE {COUNTRY_FILTER} ORDER BY common_name, cca3 LIMIT $3 OFFSET $4");
        let rows: Vec<CountryRow> = sqlx::query_as(&query)
            .bind(filter.region.as_deref())
            .bind(filter.search.as_deref().map(Self::search_pattern))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get country list: {err}")))?;
        Ok(rows.into_iter().map(CountryType::from).collect())
    }

    #[instrument(skip(self), fields(result))]
    async fn distinct_regions(&self) -> Result<Vec<String>, ApplicationError> {
        let span = tracing::Span::current();
        let rows: Vec<(String,)> = sqlx::query_as(QUERY_DISTINCT_REGIONS)
            .fetch_all(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get regions: {err}")))?;
        Ok(rows.into_iter().map(|(region,)| region).collect())
    }

    #[instrument(skip(self), fields(result))]
    async fn top_by_population(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("SELECT {COUNTRY_COLUMNS} FROM country ORDER BY population DESC, common_name LIMIT $1");
        let rows: Vec<CountryRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get top population: {err}")))?;
        Ok(rows.into_iter().map(CountryType::from).collect())
    }

    #[instrument(skip(self), fields(result))]
    async fn top_by_area(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("SELECT {COUNTRY_COLUMNS} FROM country WHERE area IS NOT NULL ORDER BY area DESC, common_name LIMIT $1");
        let rows: Vec<CountryRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get top area: {err}")))?;
        Ok(rows.into_iter().map(CountryType::from).collect())
    }

    #[instrument(skip(self), fields(result))]
    async fn region_distribution(&self) -> Result<Vec<RegionCountType>, ApplicationError> {
        let span = tracing::Span::current();
        let rows: Vec<QueryRegionCountDbResp> = sqlx::query_as(QUERY_REGION_DISTRIBUTION)
            .fetch_all(&self.connection_pool)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get region distribution: {err}")))?;
        Ok(rows.into_iter().map(RegionCountType::from).collect())
    }
}

#[cfg(test)]
mod test {
    use crate::dao::countries::CountryDao;

    #[test]
    fn test_search_pattern() {
        assert_eq!(CountryDao::search_pattern("fran"), "%fran%");
    }

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(CountryDao::search_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }
}
