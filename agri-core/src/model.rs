use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A normalized place name.
///
/// The display spelling is preserved; equality and hashing ignore case so
/// "lahore" and "Lahore" name the same city.
#[derive(Debug, Clone)]
pub struct City {
    name: String,
    key: String,
}

impl City {
    /// Build a city from raw text. Returns `None` when the trimmed text is empty.
    pub fn new(raw: &str) -> Option<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return None;
        }

        Some(Self { name: name.to_string(), key: name.to_lowercase() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased name used for matching.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Case-insensitive substring match against an already lowercased needle.
    pub fn contains_folded(&self, needle: &str) -> bool {
        self.key.contains(needle)
    }
}

impl PartialEq for City {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for City {}

impl Hash for City {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for City {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for City {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name).then_with(|| self.key.cmp(&other.key))
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for City {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for City {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        City::new(&raw).ok_or_else(|| serde::de::Error::custom("city name must not be blank"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Current conditions shown in the weather panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub temp_c: f64,
    pub condition: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub condition: String,
    pub icon: String,
}

/// Daily forecast plus the alerts the forecast source attaches to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub days: Vec<ForecastDay>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event: String,
    pub headline: String,
    #[serde(default)]
    pub description: String,
    pub expires: Option<DateTime<Utc>>,
}

impl Alert {
    /// An alert without a known expiry is treated as active.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// One row of the market-rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandiRate {
    pub mandi: String,
    pub item: String,
    pub category: String,
    pub min_price: f64,
    pub max_price: f64,
    pub retail_price: f64,
    pub unit: String,
}

/// The signed-in user's profile. Only `city` drives the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub city: String,
}

impl Profile {
    pub fn city(&self) -> Option<City> {
        City::new(&self.city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn city_trims_and_rejects_blank() {
        let city = City::new("  Lahore ").expect("non-blank");
        assert_eq!(city.name(), "Lahore");
        assert!(City::new("   ").is_none());
    }

    #[test]
    fn city_equality_ignores_case() {
        let a = City::new("Karachi").unwrap();
        let b = City::new("KARACHI").unwrap();
        assert_eq!(a, b);

        let set: HashSet<City> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn alert_without_expiry_is_active() {
        let alert = Alert {
            event: "Heat".into(),
            headline: "Heatwave".into(),
            description: String::new(),
            expires: None,
        };
        assert!(alert.is_active(Utc::now()));
    }

    #[test]
    fn profile_city_is_optional() {
        let profile = Profile { city: "  ".into(), ..Profile::default() };
        assert!(profile.city().is_none());
    }
}
