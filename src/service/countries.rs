use std::sync::Arc;

use tracing::{Instrument, instrument};

use crate::{
    dao::CountryStore,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{CountryListInputType, CountryListOutputType, CountryStatsOutputType, CountryType, PaginationInput, TOP_LIMIT},
    },
};

/**
 * Represents the read-only service for querying countries.
 */
pub struct CountryService {
    /**
     * The country store.
     */
    store: Arc<dyn CountryStore>,
}

impl CountryService {
    /**
     * Creates a new instance of `CountryService`.
     *
     * # Arguments
     * `store`: The country store.
     *
     * # Returns
     * A new instance of `CountryService`.
     */
    pub fn new(store: Arc<dyn CountryStore>) -> Self {
        CountryService { store }
    }

    /**
     * Retrieves one page of countries matching the filter, together with the regions available for filtering.
     *
     * # Arguments
     * `filter_params`: `CountryListInputType` with the region and search filter.
     * `pagination_input`: `PaginationInput` with the requested page.
     *
     * # Returns
     * A Result containing `CountryListOutputType` or an `ApplicationError`. The error is `NotFound` if the page is out of range.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn get_country_list(&self, filter_params: CountryListInputType, pagination_input: PaginationInput) -> Result<CountryListOutputType, ApplicationError> {
        let span = tracing::Span::current();
        let total_count = self.store.count(&filter_params).instrument(span.clone()).await?;
        let pagination = pagination_input.resolve(total_count)?;
        let countries = self.store.list(&filter_params, pagination.page_size, pagination.offset()).instrument(span.clone()).await?;
        let regions = self.store.distinct_regions().instrument(span).await?;
        Ok(CountryListOutputType { countries, pagination, regions, filter: filter_params })
    }

    /**
     * Retrieves a country by its three letter code.
     *
     * # Arguments
     * `cca3`: The three letter code.
     *
     * # Returns
     * A Result containing `CountryType` or a `NotFound` `ApplicationError` if no country has the code.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn get_country(&self, cca3: &str) -> Result<CountryType, ApplicationError> {
        let span = tracing::Span::current();
        match self.store.find_by_cca3(cca3).instrument(span).await? {
            Some(country) => Ok(country),
            None => {
                tracing::debug!("Country {} not found", cca3);
                Err(ApplicationError::new(ErrorType::NotFound, format!("Country {cca3} not found")))
            }
        }
    }

    /**
     * Retrieves the aggregate statistics: total count, largest countries by population and area, and countries per region.
     *
     * # Returns
     * A Result containing `CountryStatsOutputType` or an `ApplicationError`.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn get_stats(&self) -> Result<CountryStatsOutputType, ApplicationError> {
        let span = tracing::Span::current();
        let total_countries = self.store.count(&CountryListInputType::default()).instrument(span.clone()).await?;
        let top_population = self.store.top_by_population(TOP_LIMIT).instrument(span.clone()).await?;
        let top_area = self.store.top_by_area(TOP_LIMIT).instrument(span.clone()).await?;
        let region_distribution = self.store.region_distribution().instrument(span).await?;
        Ok(CountryStatsOutputType { total_countries, top_population, top_area, region_distribution })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dao::memory::MemoryCountryStore;
    use crate::model::models::PageSelector;
    use crate::test_support::{list_fixture, stats_fixture};

    #[tokio::test]
    async fn test_filter_by_region() {
        let service = CountryService::new(Arc::new(list_fixture().await));
        let output = service.get_country_list(CountryListInputType::new(Some("Europe".to_string()), None), PaginationInput::new(PageSelector::Number(1))).await.unwrap();
        let names: Vec<&str> = output.countries.iter().map(|country| country.common_name.as_str()).collect();
        assert_eq!(names, vec!["France", "Germany"]);
        assert_eq!(output.pagination.total_count, 2);
        assert_eq!(output.regions, vec!["Americas", "Europe"]);
        assert_eq!(output.filter.region.as_deref(), Some("Europe"));
    }

    #[tokio::test]
    async fn test_search_by_name() {
        let service = CountryService::new(Arc::new(list_fixture().await));
        let output = service.get_country_list(CountryListInputType::new(None, Some("France".to_string())), PaginationInput::new(PageSelector::Number(1))).await.unwrap();
        assert_eq!(output.countries.len(), 1);
        assert_eq!(output.countries[0].cca3, "FRA");

        let output = service.get_country_list(CountryListInputType::new(None, Some("of america".to_string())), PaginationInput::new(PageSelector::Number(1))).await.unwrap();
        assert_eq!(output.countries.len(), 1);
        assert_eq!(output.countries[0].cca3, "USA");
    }

    #[tokio::test]
    async fn test_list_pages() {
        let service = CountryService::new(Arc::new(stats_fixture(45).await));
        let second = service.get_country_list(CountryListInputType::default(), PaginationInput::new(PageSelector::Number(2))).await.unwrap();
        assert_eq!(second.countries.len(), 20);
        assert_eq!(second.pagination.num_pages, 3);
        let last = service.get_country_list(CountryListInputType::default(), PaginationInput::new(PageSelector::Last)).await.unwrap();
        assert_eq!(last.countries.len(), 5);
        assert!(!last.pagination.has_next());
        let beyond = service.get_country_list(CountryListInputType::default(), PaginationInput::new(PageSelector::Number(4))).await;
        assert_eq!(beyond.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let service = CountryService::new(Arc::new(MemoryCountryStore::new()));
        let output = service.get_country_list(CountryListInputType::default(), PaginationInput::new(PageSelector::Number(1))).await.unwrap();
        assert!(output.countries.is_empty());
        assert!(output.regions.is_empty());
    }

    #[tokio::test]
    async fn test_get_country() {
        let service = CountryService::new(Arc::new(list_fixture().await));
        let country = service.get_country("FRA").await.unwrap();
        assert_eq!(country.official_name, "French Republic");
        assert_eq!(service.get_country("XXX").await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_stats() {
        let service = CountryService::new(Arc::new(stats_fixture(15).await));
        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.total_countries, 15);
        assert_eq!(stats.top_population.len(), 10);
        assert_eq!(stats.top_area.len(), 10);
        assert_eq!(stats.top_population[0].common_name, "Country 0");
        assert_eq!(stats.top_area[0].cca3, stats.top_population[0].cca3);
        let regions: Vec<&str> = stats.region_distribution.iter().map(|region_count| region_count.region.as_str()).collect();
        assert_eq!(regions, vec!["Europe", "Asia"]);
        assert_eq!(stats.region_distribution[0].count, 10);
        assert_eq!(stats.region_distribution[1].count, 5);
    }
}
