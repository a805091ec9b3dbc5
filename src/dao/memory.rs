use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    dao::CountryStore,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{CountryListInputType, CountryType, CountryUpsertInputType, RegionCountType, UpsertOutcome},
    },
};

/**
 * In-process implementation of `CountryStore` with the same matching and ordering rules as the Postgres store.
 */
#[derive(Default)]
pub struct MemoryCountryStore {
    countries: RwLock<BTreeMap<String, CountryType>>,
}

impl MemoryCountryStore {
    pub fn new() -> Self {
        MemoryCountryStore::default()
    }

    fn matches(country: &CountryType, filter: &CountryListInputType) -> bool {
        if let Some(region) = &filter.region {
            if &country.region != region {
                return false;
            }
        }
        match &filter.search {
            Some(search) => {
                let search = search.to_lowercase();
                country.common_name.to_lowercase().contains(&search) || country.official_name.to_lowercase().contains(&search)
            }
            None => true,
        }
    }

    fn to_usize(value: i64) -> Result<usize, ApplicationError> {
        usize::try_from(value).map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Invalid limit or offset {value}: {err}")))
    }
}

#[async_trait]
impl CountryStore for MemoryCountryStore {
    async fn upsert(&self, input: CountryUpsertInputType) -> Result<UpsertOutcome, ApplicationError> {
        let now = Utc::now();
        let mut countries = self.countries.write().await;
        match countries.get_mut(&input.cca3) {
            Some(existing) => {
                existing.apply(input, now);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                countries.insert(input.cca3.clone(), CountryType::new(input, now));
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn insert(&self, input: CountryUpsertInputType) -> Result<(), ApplicationError> {
        let mut countries = self.countries.write().await;
        if countries.contains_key(&input.cca3) {
            return Err(ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string()));
        }
        countries.insert(input.cca3.clone(), CountryType::new(input, Utc::now()));
        Ok(())
    }

    async fn find_by_cca3(&self, cca3: &str) -> Result<Option<CountryType>, ApplicationError> {
        Ok(self.countries.read().await.get(cca3).cloned())
    }

    async fn count(&self, filter: &CountryListInputType) -> Result<i64, ApplicationError> {
        let countries = self.countries.read().await;
        let count = countries.values().filter(|country| Self::matches(country, filter)).count();
        i64::try_from(count).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to count countries: {err}")))
    }

    async fn list(&self, filter: &CountryListInputType, limit: i64, offset: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let (limit, offset) = (Self::to_usize(limit)?, Self::to_usize(offset)?);
        let countries = self.countries.read().await;
        let mut matching: Vec<&CountryType> = countries.values().filter(|country| Self::matches(country, filter)).collect();
        matching.sort_by(|a, b| a.common_name.cmp(&b.common_name).then_with(|| a.cca3.cmp(&b.cca3)));
        Ok(matching.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn distinct_regions(&self) -> Result<Vec<String>, ApplicationError> {
        let countries = self.countries.read().await;
        let regions: BTreeSet<&String> = countries.values().map(|country| &country.region).collect();
        Ok(regions.into_iter().cloned().collect())
    }

    async fn top_by_population(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let limit = Self::to_usize(limit)?;
        let countries = self.countries.read().await;
        let mut sorted: Vec<&CountryType> = countries.values().collect();
        sorted.sort_by(|a, b| b.population.cmp(&a.population).then_with(|| a.common_name.cmp(&b.common_name)));
        Ok(sorted.into_iter().take(limit).cloned().collect())
    }

    async fn top_by_area(&self, limit: i64) -> Result<Vec<CountryType>, ApplicationError> {
        let limit = Self::to_usize(limit)?;
        let countries = self.countries.read().await;
        let mut with_area: Vec<&CountryType> = countries.values().filter(|country| country.area.is_some()).collect();
        with_area.sort_by(|a, b| b.area.cmp(&a.area).then_with(|| a.common_name.cmp(&b.common_name)));
        Ok(with_area.into_iter().take(limit).cloned().collect())
    }

    async fn region_distribution(&self) -> Result<Vec<RegionCountType>, ApplicationError> {
        let countries = self.countries.read().await;
        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for country in countries.values() {
            *counts.entry(country.region.as_str()).or_default() += 1;
        }
        let mut distribution: Vec<RegionCountType> = counts.into_iter().map(|(region, count)| RegionCountType { region: region.to_string(), count }).collect();
        // BTreeMap iteration is sorted by region, the stable sort keeps that order within equal counts.
        distribution.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(distribution)
    }
}
