use actix_web::{
    HttpRequest, HttpResponse, get,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{CountryElement, CountryListQuery, CountryListResponse, CountryStatsResponse},
        state::AppState,
    },
    model::{
        apperror::ApplicationError,
        models::{CountryListInputType, PaginationInput},
    },
};

/**
 * Endpoint to retrieve a page of countries, optionally filtered by region and name.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listCountries", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/countries")]
pub async fn country_list(http_request: HttpRequest, query: web::Query<CountryListQuery>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let query = query.into_inner();
    let pagination_input = PaginationInput::parse(query.page.as_deref())?;
    let filter_params = CountryListInputType::new(query.region, query.search);
    let output = app_state.country_service.get_country_list(filter_params, pagination_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountryListResponse::from(output)))
}

/**
 * Endpoint to retrieve a single country by its three letter code.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "getCountry", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/countries/{cca3}")]
pub async fn country_detail(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let cca3 = path.into_inner();
    let country = app_state.country_service.get_country(&cca3).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountryElement::from(country)))
}

/**
 * Endpoint to retrieve the country statistics.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "countryStats", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/stats")]
pub async fn country_stats(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let output = app_state.country_service.get_stats().instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountryStatsResponse::from(output)))
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID")
        .and_then(|v| v.to_str().ok().map(std::string::ToString::to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
