//! The static list of known cities and the substring search behind the
//! suggestion list.

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::Read,
    path::PathBuf,
};

use crate::{
    error::CatalogParseError,
    model::{City, Coordinates},
    provider::CityDataSource,
};

/// Upper bound on suggestions returned by [`CityCatalog::search`].
pub const MAX_SUGGESTIONS: usize = 10;

/// One raw row of the city list. Every column is optional so that sparse
/// rows deserialize and get filtered instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CityRow {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl CityRow {
    pub fn new(city: &str, country: &str) -> Self {
        Self { city: Some(city.to_string()), country: Some(country.to_string()), lat: None, lng: None }
    }
}

/// Sorted, deduplicated cities of a single country.
#[derive(Debug, Clone, Default)]
pub struct CityCatalog {
    cities: Vec<City>,
    coordinates: HashMap<City, Coordinates>,
}

impl CityCatalog {
    /// Keep the rows of `country`, extract their city names and sort them.
    ///
    /// Rows without a city or country are skipped. Duplicates (ignoring case)
    /// keep the first spelling seen.
    pub fn load<'a, I>(rows: I, country: &str) -> Self
    where
        I: IntoIterator<Item = &'a CityRow>,
    {
        let wanted = country.trim().to_lowercase();
        let mut seen = HashSet::new();
        let mut cities = Vec::new();
        let mut coordinates = HashMap::new();

        for row in rows {
            let Some(row_country) = row.country.as_deref() else { continue };
            if row_country.trim().to_lowercase() != wanted {
                continue;
            }
            let Some(city) = row.city.as_deref().and_then(City::new) else { continue };

            if !seen.insert(city.clone()) {
                continue;
            }
            if let (Some(lat), Some(lng)) = (row.lat, row.lng) {
                coordinates.insert(city.clone(), Coordinates { lat, lng });
            }
            cities.push(city);
        }

        cities.sort();
        debug!("Loaded {} cities for {country}", cities.len());

        Self { cities, coordinates }
    }

    /// Up to [`MAX_SUGGESTIONS`] cities containing `query`, ignoring case, in
    /// catalog order. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<City> {
        if query.is_empty() {
            return Vec::new();
        }

        let needle = query.to_lowercase();
        self.cities
            .iter()
            .filter(|c| c.contains_folded(&needle))
            .take(MAX_SUGGESTIONS)
            .cloned()
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&City> {
        let probe = City::new(name)?;
        self.cities.iter().find(|c| **c == probe)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn coordinates(&self, city: &City) -> Option<Coordinates> {
        self.coordinates.get(city).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &City> {
        self.cities.iter()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Reads the city list from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvCitySource {
    path: PathBuf,
}

impl CsvCitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse rows from any reader. Records that fail to parse are returned
    /// separately so the caller can count them; they never abort the load.
    pub fn read_rows<R: Read>(reader: R) -> (Vec<CityRow>, Vec<CatalogParseError>) {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        let mut skipped = Vec::new();

        for result in rdr.deserialize::<CityRow>() {
            match result {
                Ok(row) => rows.push(row),
                Err(err) => {
                    let line = err.position().map(|p| p.line()).unwrap_or_default();
                    let skip = CatalogParseError { line, reason: err.to_string() };
                    debug!("Skipping city row: {skip}");
                    skipped.push(skip);
                }
            }
        }

        (rows, skipped)
    }
}

impl CityDataSource for CsvCitySource {
    fn load_rows(&self) -> Result<Vec<CityRow>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open city list: {}", self.path.display()))?;

        let (rows, skipped) = Self::read_rows(file);
        if !skipped.is_empty() {
            debug!("{} malformed rows skipped in {}", skipped.len(), self.path.display());
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> CityCatalog {
        let rows: Vec<CityRow> = names.iter().map(|n| CityRow::new(n, "Pakistan")).collect();
        CityCatalog::load(&rows, "Pakistan")
    }

    fn names(cities: &[City]) -> Vec<&str> {
        cities.iter().map(City::name).collect()
    }

    #[test]
    fn load_filters_country_trims_and_sorts() {
        let rows = vec![
            CityRow::new(" Multan ", " pakistan"),
            CityRow::new("Delhi", "India"),
            CityRow::new("Karachi", "PAKISTAN"),
            CityRow { city: None, country: Some("Pakistan".into()), ..CityRow::default() },
            CityRow { city: Some("Quetta".into()), country: None, ..CityRow::default() },
        ];

        let catalog = CityCatalog::load(&rows, "Pakistan");
        let all: Vec<&str> = catalog.iter().map(City::name).collect();
        assert_eq!(all, vec!["Karachi", "Multan"]);
    }

    #[test]
    fn load_deduplicates_ignoring_case() {
        let catalog = catalog(&["Lahore", "lahore", "Lahore "]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.iter().next().unwrap().name(), "Lahore");
    }

    #[test]
    fn search_matches_substring_case_insensitively_in_catalog_order() {
        let catalog = catalog(&["Lahore", "Kohat", "Lalian", "Islamabad"]);
        assert_eq!(names(&catalog.search("la")), vec!["Islamabad", "Lahore", "Lalian"]);
        assert_eq!(names(&catalog.search("LAH")), vec!["Lahore"]);
    }

    #[test]
    fn search_caps_results() {
        let many: Vec<String> = (0..25).map(|i| format!("Town {i:02}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let catalog = catalog(&refs);

        let hits = catalog.search("town");
        assert_eq!(hits.len(), MAX_SUGGESTIONS);
        assert_eq!(hits[0].name(), "Town 00");
        assert!(hits.iter().all(|c| c.key().contains("town")));
    }

    #[test]
    fn empty_query_yields_nothing() {
        let catalog = catalog(&["Lahore"]);
        assert!(catalog.search("").is_empty());
    }

    #[test]
    fn coordinates_are_kept_when_present() {
        let rows = vec![CityRow {
            city: Some("Lahore".into()),
            country: Some("Pakistan".into()),
            lat: Some(31.5497),
            lng: Some(74.3436),
        }];
        let catalog = CityCatalog::load(&rows, "Pakistan");
        let lahore = catalog.find("lahore").unwrap().clone();
        assert_eq!(catalog.coordinates(&lahore), Some(Coordinates { lat: 31.5497, lng: 74.3436 }));
    }

    #[test]
    fn csv_rows_skip_malformed_records() {
        let data = "city,country,lat,lng\nLahore,Pakistan,31.5,74.3\nKarachi,Pakistan,abc,67.0\nMultan,Pakistan,,\n";
        let (rows, skipped) = CsvCitySource::read_rows(data.as_bytes());

        assert_eq!(rows.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 3);

        let catalog = CityCatalog::load(&rows, "pakistan");
        assert_eq!(catalog.len(), 2);
    }
}
