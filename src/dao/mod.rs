pub mod countries;
pub mod memory;

use async_trait::async_trait;

use crate::model::{
    apperror::ApplicationError,
    models::{CountryListInputType, CountryType, CountryUpsertInputType, RegionCountType, UpsertOutcome},
};

/**
 * Persistent keyed store of countries. The three letter code is the only identity used for matching.
 */
#[async_trait]
pub trait CountryStore: Send + Sync {
    /**
     * Creates the country if no row with the same code exists, otherwise overwrites every attribute of the existing row.
     */
    async fn upsert(&self, input: CountryUpsertInputType) -> Result<UpsertOutcome, ApplicationError>;

    /**
     * Creates the country. Fails with `ConstraintViolation` if the code already exists.
     */
    async fn insert(&self, input: CountryUpsertInputType) -> Result<(), ApplicationError>;

    async fn find_by_cca3(&self, cca3: &str) -> Result<Option<CountryType>, ApplicationError>;

    /**
     * Number of countries matching the filter.
     */
    async fn count(&self, filter: &CountryListInputType) -> Result<i64, ApplicationError>;

    /**
     * Countries matching the filter ordered by common name.
     */
    async fn list(&self, filter: &CountryListInputType, limit: i64, offset: i64) -> Result<Vec<CountryType>, ApplicationError>;

    /**
     * Distinct regions, sorted.
     */
    async fn distinct_regions(&self) -> Result<Vec<String>, ApplicationError>;

    async fn top_by_population(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError>;

    /**
     * Countries with a known area, largest first.
     */
    async fn top_by_area(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError>;

    /**
     * Number of countries per region, largest group first.
     */
    async fn region_distribution(&self) -> Result<Vec<RegionCountType>, ApplicationError>;
}
