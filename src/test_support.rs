use rust_decimal::Decimal;

use crate::{
    dao::{CountryStore, memory::MemoryCountryStore},
    model::models::{CountryUpsertInputType, CurrenciesType},
};

/**
 * Store with France and Germany in Europe and the United States in the Americas.
 */
pub async fn list_fixture() -> MemoryCountryStore {
    let store = MemoryCountryStore::new();
    for (cca3, common_name, official_name, capital, region, population, area) in [
        ("FRA", "France", "French Republic", Some("Paris"), "Europe", 67_000_000, 551_695),
        ("DEU", "Germany", "Federal Republic of Germany", None, "Europe", 83_000_000, 357_022),
        ("USA", "United States", "United States of America", None, "Americas", 331_000_000, 9_833_517),
    ] {
        store
            .insert(CountryUpsertInputType {
                cca3: cca3.to_string(),
                cca2: cca3[..2].to_string(),
                common_name: common_name.to_string(),
                official_name: official_name.to_string(),
                capital: capital.map(str::to_string),
                region: region.to_string(),
                subregion: None,
                population,
                area: Some(Decimal::from(area)),
                flag_url: None,
                currencies: CurrenciesType::new(),
            })
            .await
            .unwrap();
    }
    store
}

/**
 * Store with `count` countries of strictly decreasing population and area. The first ten are in Europe, the rest in Asia.
 */
pub async fn stats_fixture(count: i64) -> MemoryCountryStore {
    let store = MemoryCountryStore::new();
    for i in 0..count {
        store
            .insert(CountryUpsertInputType {
                cca3: format!("C{i:02}"),
                cca2: format!("{:02}", i % 100),
                common_name: format!("Country {i}"),
                official_name: format!("Official Country {i}"),
                capital: None,
                region: if i < 10 { "Europe".to_string() } else { "Asia".to_string() },
                subregion: None,
                population: 1_000_000 * (count - i),
                area: Some(Decimal::from(100_000 * (count - i))),
                flag_url: None,
                currencies: CurrenciesType::new(),
            })
            .await
            .unwrap();
    }
    store
}
