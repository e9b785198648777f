use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::join::Keyed;

// Raw rows, one struct per BAAC file. Every field is read as text so that a
// single odd value never rejects the whole row; typing happens afterwards.

#[derive(Debug, Deserialize)]
pub struct RawCharacteristics {
    #[serde(rename = "Num_Acc")]
    pub num_acc: Option<String>,
    #[serde(rename = "jour")]
    pub jour: Option<String>,
    #[serde(rename = "mois")]
    pub mois: Option<String>,
    #[serde(rename = "an")]
    pub an: Option<String>,
    #[serde(rename = "hrmn")]
    pub hrmn: Option<String>,
    #[serde(rename = "lum")]
    pub lum: Option<String>,
    #[serde(rename = "dep")]
    pub dep: Option<String>,
    #[serde(rename = "com")]
    pub com: Option<String>,
    #[serde(rename = "agg")]
    pub agg: Option<String>,
    #[serde(rename = "int")]
    pub int: Option<String>,
    #[serde(rename = "atm")]
    pub atm: Option<String>,
    #[serde(rename = "col")]
    pub col: Option<String>,
    #[serde(rename = "adr")]
    pub adr: Option<String>,
    #[serde(rename = "lat")]
    pub lat: Option<String>,
    #[serde(rename = "long")]
    pub long: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawLocation {
    #[serde(rename = "Num_Acc")]
    pub num_acc: Option<String>,
    #[serde(rename = "catr")]
    pub catr: Option<String>,
    #[serde(rename = "circ")]
    pub circ: Option<String>,
    #[serde(rename = "nbv")]
    pub nbv: Option<String>,
    #[serde(rename = "prof")]
    pub prof: Option<String>,
    #[serde(rename = "plan")]
    pub plan: Option<String>,
    #[serde(rename = "surf")]
    pub surf: Option<String>,
    #[serde(rename = "infra")]
    pub infra: Option<String>,
    #[serde(rename = "situ")]
    pub situ: Option<String>,
    #[serde(rename = "vma")]
    pub vma: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawUser {
    #[serde(rename = "Num_Acc")]
    pub num_acc: Option<String>,
    #[serde(rename = "id_vehicule")]
    pub id_vehicule: Option<String>,
    #[serde(rename = "place")]
    pub place: Option<String>,
    #[serde(rename = "catu")]
    pub catu: Option<String>,
    #[serde(rename = "grav")]
    pub grav: Option<String>,
    #[serde(rename = "sexe")]
    pub sexe: Option<String>,
    #[serde(rename = "an_nais")]
    pub an_nais: Option<String>,
    #[serde(rename = "trajet")]
    pub trajet: Option<String>,
    #[serde(rename = "secu1")]
    pub secu1: Option<String>,
    #[serde(rename = "secu2")]
    pub secu2: Option<String>,
    #[serde(rename = "secu3")]
    pub secu3: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawVehicle {
    #[serde(rename = "Num_Acc")]
    pub num_acc: Option<String>,
    #[serde(rename = "id_vehicule")]
    pub id_vehicule: Option<String>,
    #[serde(rename = "senc")]
    pub senc: Option<String>,
    #[serde(rename = "catv")]
    pub catv: Option<String>,
    #[serde(rename = "obs")]
    pub obs: Option<String>,
    #[serde(rename = "obsm")]
    pub obsm: Option<String>,
    #[serde(rename = "choc")]
    pub choc: Option<String>,
    #[serde(rename = "manv")]
    pub manv: Option<String>,
    #[serde(rename = "motor")]
    pub motor: Option<String>,
}

/// One accident, after cleaning. The packed `hrmn` field is gone: only
/// `hour` and `minute` remain.
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristics {
    pub accident_id: String,
    pub day: Option<u32>,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub hour: u32,
    pub minute: u32,
    pub lighting: Option<i32>,
    pub department: i32,
    pub municipality: Option<String>,
    pub agglomeration: Option<i32>,
    pub intersection: Option<i32>,
    pub weather: Option<i32>,
    pub collision: Option<i32>,
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl Characteristics {
    pub fn date(&self) -> Option<NaiveDate> {
        let month = u32::try_from(self.month?).ok()?;
        NaiveDate::from_ymd_opt(self.year?, month, self.day?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub accident_id: String,
    pub road_category: Option<i32>,
    pub circulation: Option<i32>,
    pub lanes: Option<i32>,
    pub profile: Option<i32>,
    pub plan: Option<i32>,
    pub surface: Option<i32>,
    pub infrastructure: Option<i32>,
    pub situation: Option<i32>,
    pub speed_limit: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub accident_id: String,
    pub vehicle_id: Option<String>,
    pub seat: Option<i32>,
    pub category: Option<i32>,
    pub severity: Option<i32>,
    pub sex: Option<i32>,
    pub birth_year: Option<i32>,
    pub journey: Option<i32>,
    pub safety: [Option<i32>; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub accident_id: String,
    pub vehicle_id: Option<String>,
    pub direction: Option<i32>,
    pub category: Option<i32>,
    pub fixed_obstacle: Option<i32>,
    pub mobile_obstacle: Option<i32>,
    pub impact: Option<i32>,
    pub maneuver: Option<i32>,
    pub motor: Option<i32>,
}

impl Keyed for Characteristics {
    fn accident_id(&self) -> &str {
        &self.accident_id
    }
}

impl Keyed for Location {
    fn accident_id(&self) -> &str {
        &self.accident_id
    }
}

impl Keyed for User {
    fn accident_id(&self) -> &str {
        &self.accident_id
    }
}

impl Keyed for Vehicle {
    fn accident_id(&self) -> &str {
        &self.accident_id
    }
}

/// The four cleaned tables of one year.
#[derive(Debug, Clone, Default)]
pub struct YearTables {
    pub year: i32,
    pub characteristics: Vec<Characteristics>,
    pub locations: Vec<Location>,
    pub users: Vec<User>,
    pub vehicles: Vec<Vehicle>,
}

/// Column names and cell text of a cleaned table, for profiling and the
/// head preview. An empty cell counts as missing.
pub trait TableColumns {
    const COLUMNS: &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

fn cell<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(T::to_string).unwrap_or_default()
}

impl TableColumns for Characteristics {
    const COLUMNS: &'static [&'static str] = &[
        "Num_Acc", "jour", "mois", "an", "hour", "minute", "lum", "dep", "com", "agg", "int",
        "atm", "col", "adr", "lat", "long",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.accident_id.clone(),
            cell(&self.day),
            cell(&self.month),
            cell(&self.year),
            self.hour.to_string(),
            self.minute.to_string(),
            cell(&self.lighting),
            self.department.to_string(),
            cell(&self.municipality),
            cell(&self.agglomeration),
            cell(&self.intersection),
            cell(&self.weather),
            cell(&self.collision),
            cell(&self.address),
            self.lat.to_string(),
            self.lon.to_string(),
        ]
    }
}

impl TableColumns for Location {
    const COLUMNS: &'static [&'static str] = &[
        "Num_Acc", "catr", "circ", "nbv", "prof", "plan", "surf", "infra", "situ", "vma",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.accident_id.clone(),
            cell(&self.road_category),
            cell(&self.circulation),
            cell(&self.lanes),
            cell(&self.profile),
            cell(&self.plan),
            cell(&self.surface),
            cell(&self.infrastructure),
            cell(&self.situation),
            cell(&self.speed_limit),
        ]
    }
}

impl TableColumns for User {
    const COLUMNS: &'static [&'static str] = &[
        "Num_Acc", "id_vehicule", "place", "catu", "grav", "sexe", "an_nais", "trajet", "secu1",
        "secu2", "secu3",
    ];

    fn cells(&self) -> Vec<String> {
        let mut cells = vec![
            self.accident_id.clone(),
            cell(&self.vehicle_id),
            cell(&self.seat),
            cell(&self.category),
            cell(&self.severity),
            cell(&self.sex),
            cell(&self.birth_year),
            cell(&self.journey),
        ];
        cells.extend(self.safety.iter().map(cell));
        cells
    }
}

impl TableColumns for Vehicle {
    const COLUMNS: &'static [&'static str] = &[
        "Num_Acc", "id_vehicule", "senc", "catv", "obs", "obsm", "choc", "manv", "motor",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.accident_id.clone(),
            cell(&self.vehicle_id),
            cell(&self.direction),
            cell(&self.category),
            cell(&self.fixed_obstacle),
            cell(&self.mobile_obstacle),
            cell(&self.impact),
            cell(&self.maneuver),
            cell(&self.motor),
        ]
    }
}

/// Shape, missing-value counts and first rows of one cleaned table.
#[derive(Debug, Clone, Serialize)]
pub struct TableProfile {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_per_column: Vec<usize>,
    pub head: Vec<Vec<String>>,
}

fn display_ratio(v: &f64) -> String {
    format!("{:.4}", v)
}

fn display_2dp(v: &f64) -> String {
    crate::util::format_number(*v, 2)
}

/// Row count for one (category, severity) cell.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SeverityCountRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Severity")]
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}

/// Same cell, with its share of the category total.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SeverityShareRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Severity")]
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Proportion")]
    #[tabled(rename = "Proportion", display_with = "display_ratio")]
    pub proportion: f64,
}

/// Pie-chart slice.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ShareRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Percent")]
    #[tabled(rename = "Percent", display_with = "display_2dp")]
    pub percent: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct GenderSeverityRow {
    #[serde(rename = "Sex")]
    #[tabled(rename = "Sex")]
    pub sex: String,
    #[serde(rename = "Severity")]
    #[tabled(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "PopulationShare")]
    #[tabled(rename = "PopulationShare", display_with = "display_ratio")]
    pub population_share: f64,
    #[serde(rename = "RescaledCount")]
    #[tabled(rename = "RescaledCount", display_with = "display_2dp")]
    pub rescaled_count: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct PointRow {
    #[serde(rename = "AccidentId")]
    #[tabled(rename = "AccidentId")]
    pub accident_id: String,
    #[serde(rename = "Lat")]
    #[tabled(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Long")]
    #[tabled(rename = "Long")]
    pub lon: f64,
    #[serde(rename = "Sentinel")]
    #[tabled(rename = "Sentinel")]
    pub sentinel: bool,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct YearCountRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Accidents")]
    #[tabled(rename = "Accidents")]
    pub accidents: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ColumnProfileRow {
    #[serde(rename = "Table")]
    #[tabled(rename = "Table")]
    pub table: String,
    #[serde(rename = "Column")]
    #[tabled(rename = "Column")]
    pub column: String,
    #[serde(rename = "Missing")]
    #[tabled(rename = "Missing")]
    pub missing: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct TableShapeRow {
    #[serde(rename = "Table")]
    #[tabled(rename = "Table")]
    pub table: String,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[serde(rename = "Columns")]
    #[tabled(rename = "Columns")]
    pub columns: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SummaryStats {
    pub year: i32,
    pub total_accidents: usize,
    pub total_deaths: usize,
    pub joined_rows: usize,
    pub dropped_users: usize,
    pub dropped_vehicles: usize,
}
