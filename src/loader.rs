use crate::config::Settings;
use crate::error::{DashboardError, Result};
use crate::types::{
    Characteristics, Location, RawCharacteristics, RawLocation, RawUser, RawVehicle,
    TableColumns, TableProfile, User, Vehicle, YearTables,
};
use crate::util::{
    decode_text, normalize_year, parse_code, parse_coordinate, parse_department,
    split_hour_minute, COORD_SENTINEL,
};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub year: i32,
    pub total_rows: usize,
    pub parse_errors: usize,
    pub sentinel_coords: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub profiles: Vec<TableProfile>,
}

/// Characteristics and users of one year, for the multi-year trend.
#[derive(Debug, Clone)]
pub struct TrendSlice {
    pub year: i32,
    pub characteristics: Vec<Characteristics>,
    pub users: Vec<User>,
}

struct TableRead<T> {
    rows: Vec<T>,
    total_rows: usize,
    parse_errors: usize,
}

/// Rows shown by the data-info head preview.
pub const HEAD_ROWS: usize = 5;

/// Column every BAAC file is keyed on.
const KEY_COLUMN: &str = "Num_Acc";

/// File names follow the BAAC convention: `<data_dir>/<year>/<table>-<year>.csv`.
pub fn table_path(data_dir: &Path, table: &str, year: i32) -> PathBuf {
    data_dir
        .join(year.to_string())
        .join(format!("{}-{}.csv", table, year))
}

/// Extracts from 2019 on are `;`-separated, older ones use `,`.
pub fn delimiter_for(year: i32) -> u8 {
    if year >= 2019 {
        b';'
    } else {
        b','
    }
}

/// Load and clean the four tables of `year`.
///
/// Fails when the year is outside the configured range, when any of the four
/// files is missing, or when a file is malformed as a whole (unreadable
/// header, no `Num_Acc` column, or data rows of which none survive
/// cleaning). Single bad rows are skipped and counted in the report instead.
pub fn load_year(settings: &Settings, year: i32) -> Result<(YearTables, LoadReport)> {
    settings.check_year(year)?;
    let dir = settings.data_dir.as_path();
    let delimiter = delimiter_for(year);

    // Check all four files up front so a missing table is reported before
    // any parsing work.
    for table in ["caracteristiques", "lieux", "usagers", "vehicules"] {
        let path = table_path(dir, table, year);
        if !path.is_file() {
            return Err(DashboardError::MissingFile(path));
        }
    }

    let mut sentinel_coords = 0usize;
    let characteristics = read_table(
        &table_path(dir, "caracteristiques", year),
        "caracteristiques",
        delimiter,
        |raw: RawCharacteristics| {
            let row = clean_characteristics(raw)?;
            if row.lat == COORD_SENTINEL || row.lon == COORD_SENTINEL {
                sentinel_coords += 1;
            }
            Some(row)
        },
    )?;
    let locations = read_table(&table_path(dir, "lieux", year), "lieux", delimiter, to_location)?;
    let users = read_table(&table_path(dir, "usagers", year), "usagers", delimiter, to_user)?;
    let vehicles = read_table(
        &table_path(dir, "vehicules", year),
        "vehicules",
        delimiter,
        to_vehicle,
    )?;

    let dates: Vec<NaiveDate> = characteristics.rows.iter().filter_map(|c| c.date()).collect();
    let report = LoadReport {
        year,
        total_rows: characteristics.total_rows
            + locations.total_rows
            + users.total_rows
            + vehicles.total_rows,
        parse_errors: characteristics.parse_errors
            + locations.parse_errors
            + users.parse_errors
            + vehicles.parse_errors,
        sentinel_coords,
        first_date: dates.iter().min().copied(),
        last_date: dates.iter().max().copied(),
        profiles: vec![
            profile("caracteristiques", &characteristics.rows),
            profile("lieux", &locations.rows),
            profile("usagers", &users.rows),
            profile("vehicules", &vehicles.rows),
        ],
    };
    info!(
        year,
        accidents = characteristics.rows.len(),
        users = users.rows.len(),
        vehicles = vehicles.rows.len(),
        parse_errors = report.parse_errors,
        sentinel_coords,
        "loaded yearly tables"
    );

    let tables = YearTables {
        year,
        characteristics: characteristics.rows,
        locations: locations.rows,
        users: users.rows,
        vehicles: vehicles.rows,
    };
    Ok((tables, report))
}

/// Load characteristics and users for every year of the trend range.
/// The supported-years bound does not apply here.
pub fn load_trend(settings: &Settings) -> Result<Vec<TrendSlice>> {
    let dir = settings.data_dir.as_path();
    let mut slices = Vec::new();
    for year in settings.trend_years.years() {
        let delimiter = delimiter_for(year);
        let characteristics = read_table(
            &table_path(dir, "caracteristiques", year),
            "caracteristiques",
            delimiter,
            clean_characteristics,
        )?;
        let users = read_table(&table_path(dir, "usagers", year), "usagers", delimiter, to_user)?;
        debug!(
            year,
            accidents = characteristics.rows.len(),
            users = users.rows.len(),
            "loaded trend slice"
        );
        slices.push(TrendSlice {
            year,
            characteristics: characteristics.rows,
            users: users.rows,
        });
    }
    Ok(slices)
}

fn read_table<R, T, F>(path: &Path, name: &str, delimiter: u8, mut convert: F) -> Result<TableRead<T>>
where
    R: DeserializeOwned,
    F: FnMut(R) -> Option<T>,
{
    if !path.is_file() {
        return Err(DashboardError::MissingFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| DashboardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode_text(bytes);
    let text = decoded.trim_start_matches('\u{feff}');
    let csv_err = |source| DashboardError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr.headers().map_err(csv_err)?.clone();
    // A wrong delimiter shows up here as one merged header field.
    if !headers.iter().any(|h| h.trim() == KEY_COLUMN) {
        return Err(DashboardError::MalformedFile {
            path: path.to_path_buf(),
            reason: format!(
                "no `{}` column among {} header field(s) (expected `{}` as delimiter)",
                KEY_COLUMN,
                headers.len(),
                delimiter as char
            ),
        });
    }
    let mut rows = Vec::new();
    let mut total_rows = 0usize;
    let mut parse_errors = 0usize;

    for result in rdr.records() {
        total_rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(table = name, row = total_rows, error = %e, "unreadable CSV record");
                parse_errors += 1;
                continue;
            }
        };
        match record.deserialize::<R>(Some(&headers)).ok().and_then(&mut convert) {
            Some(row) => rows.push(row),
            None => {
                debug!(table = name, row = total_rows, "row rejected during cleaning");
                parse_errors += 1;
            }
        }
    }

    if total_rows > 0 && rows.is_empty() {
        return Err(DashboardError::MalformedFile {
            path: path.to_path_buf(),
            reason: format!("none of its {} data rows could be read", total_rows),
        });
    }
    if parse_errors > 0 {
        warn!(table = name, parse_errors, total_rows, "rows skipped while loading");
    }
    Ok(TableRead {
        rows,
        total_rows,
        parse_errors,
    })
}

/// Shape, per-column missing counts and first rows of a cleaned table.
fn profile<T: TableColumns>(name: &str, rows: &[T]) -> TableProfile {
    let mut missing_per_column = vec![0usize; T::COLUMNS.len()];
    let mut head = Vec::with_capacity(HEAD_ROWS);
    for (idx, row) in rows.iter().enumerate() {
        let cells = row.cells();
        for (missing, value) in missing_per_column.iter_mut().zip(&cells) {
            if value.trim().is_empty() {
                *missing += 1;
            }
        }
        if idx < HEAD_ROWS {
            head.push(cells);
        }
    }
    TableProfile {
        name: name.to_string(),
        rows: rows.len(),
        columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
        missing_per_column,
        head,
    }
}

fn accident_id(s: Option<String>) -> Option<String> {
    let id = s?.trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Clean one characteristics row: split `hrmn`, coerce `dep`, and
/// normalize coordinates (sentinel on failure). Rows without an accident id
/// or a readable time are rejected.
pub fn clean_characteristics(raw: RawCharacteristics) -> Option<Characteristics> {
    let accident_id = accident_id(raw.num_acc)?;
    let (hour, minute) = split_hour_minute(raw.hrmn.as_deref()?)?;
    Some(Characteristics {
        accident_id,
        day: parse_code(raw.jour.as_deref()).and_then(|d| u32::try_from(d).ok()),
        month: parse_code(raw.mois.as_deref()),
        year: normalize_year(raw.an.as_deref()),
        hour,
        minute,
        lighting: parse_code(raw.lum.as_deref()),
        department: parse_department(raw.dep.as_deref()),
        municipality: non_blank(raw.com),
        agglomeration: parse_code(raw.agg.as_deref()),
        intersection: parse_code(raw.int.as_deref()),
        weather: parse_code(raw.atm.as_deref()),
        collision: parse_code(raw.col.as_deref()),
        address: non_blank(raw.adr),
        lat: parse_coordinate(raw.lat.as_deref().unwrap_or("")),
        lon: parse_coordinate(raw.long.as_deref().unwrap_or("")),
    })
}

fn to_location(raw: RawLocation) -> Option<Location> {
    Some(Location {
        accident_id: accident_id(raw.num_acc)?,
        road_category: parse_code(raw.catr.as_deref()),
        circulation: parse_code(raw.circ.as_deref()),
        lanes: parse_code(raw.nbv.as_deref()),
        profile: parse_code(raw.prof.as_deref()),
        plan: parse_code(raw.plan.as_deref()),
        surface: parse_code(raw.surf.as_deref()),
        infrastructure: parse_code(raw.infra.as_deref()),
        situation: parse_code(raw.situ.as_deref()),
        speed_limit: parse_code(raw.vma.as_deref()),
    })
}

fn to_user(raw: RawUser) -> Option<User> {
    Some(User {
        accident_id: accident_id(raw.num_acc)?,
        vehicle_id: non_blank(raw.id_vehicule),
        seat: parse_code(raw.place.as_deref()),
        category: parse_code(raw.catu.as_deref()),
        severity: parse_code(raw.grav.as_deref()),
        sex: parse_code(raw.sexe.as_deref()),
        birth_year: parse_code(raw.an_nais.as_deref()),
        journey: parse_code(raw.trajet.as_deref()),
        safety: [
            parse_code(raw.secu1.as_deref()),
            parse_code(raw.secu2.as_deref()),
            parse_code(raw.secu3.as_deref()),
        ],
    })
}

fn to_vehicle(raw: RawVehicle) -> Option<Vehicle> {
    Some(Vehicle {
        accident_id: accident_id(raw.num_acc)?,
        vehicle_id: non_blank(raw.id_vehicule),
        direction: parse_code(raw.senc.as_deref()),
        category: parse_code(raw.catv.as_deref()),
        fixed_obstacle: parse_code(raw.obs.as_deref()),
        mobile_obstacle: parse_code(raw.obsm.as_deref()),
        impact: parse_code(raw.choc.as_deref()),
        maneuver: parse_code(raw.manv.as_deref()),
        motor: parse_code(raw.motor.as_deref()),
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_year, USERS};
    use super::*;
    use crate::join::inner_join;

    fn settings_for(dir: &Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn loads_and_cleans_characteristics() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        let (tables, report) = load_year(&settings_for(dir.path()), 2021).unwrap();

        assert_eq!(tables.characteristics.len(), 4);
        let first = &tables.characteristics[0];
        assert_eq!(first.accident_id, "202100000001");
        assert_eq!((first.hour, first.minute), (7, 32));
        assert_eq!(first.department, 75);
        assert_eq!(first.lat, 48.872163);
        assert_eq!(first.lon, 2.283795);

        let lyon = &tables.characteristics[1];
        assert_eq!((lyon.hour, lyon.minute), (14, 35));
        assert_eq!(lyon.lat, 45.7578);

        let corsica = &tables.characteristics[2];
        assert_eq!(corsica.department, 0);
        assert_eq!(corsica.lat, COORD_SENTINEL);
        assert_eq!(tables.characteristics[3].department, 0);

        assert_eq!(report.sentinel_coords, 1);
        // The row with a blank Num_Acc.
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.first_date, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(report.last_date, NaiveDate::from_ymd_opt(2021, 11, 30));
    }

    #[test]
    fn other_tables_keep_raw_codes() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        let (tables, _) = load_year(&settings_for(dir.path()), 2021).unwrap();

        assert_eq!(tables.locations.len(), 4);
        assert_eq!(tables.locations[3].lanes, None);
        assert_eq!(tables.locations[3].speed_limit, Some(130));
        assert_eq!(tables.users.len(), 7);
        assert_eq!(tables.users[5].sex, Some(-1));
        assert_eq!(tables.vehicles[3].impact, Some(-1));
    }

    #[test]
    fn profiles_describe_cleaned_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        let (_, report) = load_year(&settings_for(dir.path()), 2021).unwrap();

        let chars = &report.profiles[0];
        assert_eq!(chars.name, "caracteristiques");
        // The row with a blank Num_Acc is not part of the cleaned table.
        assert_eq!(chars.rows, 4);
        assert_eq!(chars.columns.len(), 16);
        assert!(chars.columns.iter().any(|c| c == "hour"));
        assert!(chars.columns.iter().any(|c| c == "minute"));
        assert!(!chars.columns.iter().any(|c| c == "hrmn"));
        let adr = chars.columns.iter().position(|c| c == "adr").unwrap();
        assert_eq!(chars.missing_per_column[adr], 2);
        let num_acc = chars.columns.iter().position(|c| c == "Num_Acc").unwrap();
        assert_eq!(chars.missing_per_column[num_acc], 0);

        assert_eq!(chars.head.len(), 4);
        assert_eq!(chars.head[0][0], "202100000001");
        assert_eq!(chars.head[0][4], "7");
        assert_eq!(chars.head[0][5], "32");

        let users = &report.profiles[2];
        assert_eq!(users.rows, 7);
        assert_eq!(users.head.len(), HEAD_ROWS);
        assert!(users.head.iter().all(|r| r.len() == users.columns.len()));
    }

    #[test]
    fn users_and_vehicles_reference_known_accidents() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        let (tables, _) = load_year(&settings_for(dir.path()), 2021).unwrap();

        let users = inner_join(&tables.characteristics, &tables.users, "users");
        assert_eq!(users.stats.unmatched_right, 1);
        assert!(users.stats.drop_rate() < 0.1);

        let vehicles = inner_join(&tables.characteristics, &tables.vehicles, "vehicles");
        assert_eq!(vehicles.stats.unmatched_right, 0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        std::fs::remove_file(dir.path().join("2021").join("lieux-2021.csv")).unwrap();
        let err = load_year(&settings_for(dir.path()), 2021).unwrap_err();
        match err {
            DashboardError::MissingFile(p) => assert!(p.ends_with("lieux-2021.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_delimiter_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        let users = USERS.replace(';', ",");
        std::fs::write(dir.path().join("2021").join("usagers-2021.csv"), users).unwrap();

        let err = load_year(&settings_for(dir.path()), 2021).unwrap_err();
        match err {
            DashboardError::MalformedFile { path, .. } => {
                assert!(path.ends_with("usagers-2021.csv"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_without_usable_rows_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        std::fs::write(
            dir.path().join("2021").join("vehicules-2021.csv"),
            "\"Num_Acc\";\"choc\"\n\"\";\"1\"\n\"\";\"2\"\n",
        )
        .unwrap();

        let err = load_year(&settings_for(dir.path()), 2021).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedFile { .. }));
    }

    #[test]
    fn header_only_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_year(dir.path(), 2021);
        std::fs::write(
            dir.path().join("2021").join("vehicules-2021.csv"),
            "\"Num_Acc\";\"choc\"\n",
        )
        .unwrap();

        let (tables, report) = load_year(&settings_for(dir.path()), 2021).unwrap();
        assert!(tables.vehicles.is_empty());
        assert_eq!(report.year, 2021);
    }

    #[test]
    fn year_outside_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_year(&settings_for(dir.path()), 2005).unwrap_err();
        assert!(matches!(err, DashboardError::YearOutOfRange { year: 2005, .. }));
    }

    #[test]
    fn latin1_comma_separated_legacy_year() {
        let dir = tempfile::tempdir().unwrap();
        let year_dir = dir.path().join("2017");
        std::fs::create_dir_all(&year_dir).unwrap();
        let mut chars = b"Num_Acc,an,mois,jour,hrmn,lum,dep,adr,lat,long\n".to_vec();
        chars.extend_from_slice(b"201700000001,17,1,11,1820,5,590,rue de l'\xC9glise,0,0\n");
        std::fs::write(year_dir.join("caracteristiques-2017.csv"), chars).unwrap();
        std::fs::write(
            year_dir.join("usagers-2017.csv"),
            "Num_Acc,grav,sexe,trajet\n201700000001,4,1,5\n",
        )
        .unwrap();

        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            trend_years: crate::config::YearRange { first: 2017, last: 2017 },
            ..Settings::default()
        };
        let slices = load_trend(&settings).unwrap();
        assert_eq!(slices.len(), 1);
        let row = &slices[0].characteristics[0];
        assert_eq!(row.year, Some(2017));
        assert_eq!((row.hour, row.minute), (18, 20));
        assert_eq!(row.address.as_deref(), Some("rue de l'Église"));
        assert_eq!(slices[0].users[0].severity, Some(4));
    }
}
