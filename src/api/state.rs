use crate::service::countries::CountryService;

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * The country service for the list, detail and statistics queries.
     */
    pub country_service: CountryService,
}

/**
 * Creates a new instance of `AppState`.
 *
 * # Arguments
 * `country_service`: The country service for the list, detail and statistics queries.
 */
impl AppState {
    pub fn new(country_service: CountryService) -> Self {
        AppState { country_service }
    }
}
