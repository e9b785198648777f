// Runtime settings: where the yearly extracts live, which years the views
// accept, and the cities offered by the location view.
//
// Everything has a default matching the published dashboard; a JSON file
// passed with `--config` may override any subset of the fields.
use crate::error::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub first: i32,
    pub last: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.first..=self.last
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Department code used to select the city's accidents.
    pub department: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub supported_years: YearRange,
    pub trend_years: YearRange,
    pub cities: Vec<City>,
}

impl Default for Settings {
    fn default() -> Self {
        let city = |name: &str, lat, lon, department| City {
            name: name.to_string(),
            lat,
            lon,
            department,
        };
        Settings {
            data_dir: PathBuf::from("assets"),
            output_dir: PathBuf::from("reports"),
            supported_years: YearRange { first: 2019, last: 2021 },
            trend_years: YearRange { first: 2017, last: 2021 },
            cities: vec![
                city("Paris", 48.8566, 2.3522, 75),
                city("Lyon", 45.7578, 4.8320, 69),
                city("Marseille", 43.2965, 5.3698, 13),
                city("Bordeaux", 44.8378, -0.5792, 33),
                city("Nice", 43.7102, 7.2620, 6),
            ],
        }
    }
}

impl Settings {
    /// Defaults, overlaid with the JSON file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| DashboardError::Io {
                    path: p.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&text)?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for range in [&self.supported_years, &self.trend_years] {
            if range.first > range.last {
                return Err(DashboardError::InvalidConfig(format!(
                    "empty year range {}..={}",
                    range.first, range.last
                )));
            }
        }
        if self.cities.is_empty() {
            return Err(DashboardError::InvalidConfig("no cities configured".into()));
        }
        Ok(())
    }

    pub fn check_year(&self, year: i32) -> Result<()> {
        if self.supported_years.contains(year) {
            Ok(())
        } else {
            Err(DashboardError::YearOutOfRange {
                year,
                min: self.supported_years.first,
                max: self.supported_years.last,
            })
        }
    }

    /// Case-insensitive lookup.
    pub fn city(&self, name: &str) -> Result<&City> {
        self.cities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| DashboardError::UnknownCity(name.to_string()))
    }
}
