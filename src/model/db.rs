use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;

use crate::model::models::{CountryType, CurrenciesType, RegionCountType};

/**
 * Row of the `country` table.
 */
#[derive(Debug, sqlx::FromRow)]
pub struct CountryRow {
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
    pub currencies: Json<CurrenciesType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CountryRow> for CountryType {
    fn from(row: CountryRow) -> Self {
        CountryType {
            cca3: row.cca3,
            cca2: row.cca2,
            common_name: row.common_name,
            official_name: row.official_name,
            capital: row.capital,
            region: row.region,
            subregion: row.subregion,
            population: row.population,
            area: row.area,
            flag_url: row.flag_url,
            currencies: row.currencies.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/**
 * Database response type for the region distribution query.
 */
pub type QueryRegionCountDbResp = (String, i64);

impl From<QueryRegionCountDbResp> for RegionCountType {
    fn from((region, count): QueryRegionCountDbResp) -> Self {
        RegionCountType { region, count }
    }
}
