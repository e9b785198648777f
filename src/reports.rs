use crate::aggregate::{count_by, grouped_counts, Counts, Tally};
use crate::codebook::{Codebook, Dimension};
use crate::config::City;
use crate::join::{inner_join, unique_accidents};
use crate::loader::{LoadReport, TrendSlice};
use crate::types::{
    Characteristics, ColumnProfileRow, GenderSeverityRow, PointRow, SeverityCountRow,
    SeverityShareRow, ShareRow, SummaryStats, TableShapeRow, Vehicle, YearCountRow, YearTables,
};
use crate::util::COORD_SENTINEL;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// `grav` code of a fatal injury.
pub const KILLED: i32 = 2;

// Editorial exclusions, applied per view before grouping.
const SURFACE_EXCLUDED: &[i32] = &[-1, 9];
const IMPACT_EXCLUDED: &[i32] = &[-1];
const SEX_EXCLUDED: &[i32] = &[-1];
const FIXED_OBSTACLE_EXCLUDED: &[i32] = &[-1, 0];
const MOBILE_OBSTACLE_EXCLUDED: &[i32] = &[-1, 0, 9];
/// Speed limits at or above this, and unset (non-positive) ones, are left
/// out of the VMA view.
const VMA_CEILING: i32 = 130;

/// Code kept only when it has a label and is not editorially excluded.
fn mapped(book: &Codebook, dim: Dimension, code: Option<i32>, excluded: &[i32]) -> Option<i32> {
    let code = code?;
    if excluded.contains(&code) {
        return None;
    }
    book.label(dim, code).map(|_| code)
}

fn severity(book: &Codebook, code: Option<i32>) -> Option<i32> {
    mapped(book, Dimension::Severity, code, &[])
}

fn severity_counts<K: Ord + Clone>(
    book: &Codebook,
    tally: &Tally<K, i32>,
    category: impl Fn(&K) -> String,
) -> Vec<SeverityCountRow> {
    tally
        .counts()
        .into_iter()
        .map(|c| SeverityCountRow {
            category: category(&c.category),
            severity: book.label_or_code(Dimension::Severity, c.value),
            count: c.count,
        })
        .collect()
}

fn severity_shares<K: Ord + Clone>(
    book: &Codebook,
    tally: &Tally<K, i32>,
    category: impl Fn(&K) -> String,
) -> Vec<SeverityShareRow> {
    tally
        .proportions()
        .into_iter()
        .map(|p| SeverityShareRow {
            category: category(&p.category),
            severity: book.label_or_code(Dimension::Severity, p.value),
            count: p.count,
            proportion: p.proportion,
        })
        .collect()
}

fn share_rows(book: &Codebook, dim: Dimension, counts: &Counts<i32>) -> Vec<ShareRow> {
    counts
        .shares()
        .into_iter()
        .map(|(code, count, percent)| ShareRow {
            category: book.label_or_code(dim, code),
            count,
            percent,
        })
        .collect()
}

/// Headline figures: every table merged, then accidents and deaths counted
/// by unique accident id rather than by merged row.
pub fn generate_summary(tables: &YearTables) -> SummaryStats {
    let with_users = inner_join(&tables.characteristics, &tables.users, "characteristics-users");
    let with_locations = inner_join(&with_users.rows, &tables.locations, "users-locations");
    let complete = inner_join(&with_locations.rows, &tables.vehicles, "locations-vehicles");

    let total_accidents = unique_accidents(&complete.rows);
    let total_deaths = unique_accidents(
        complete
            .rows
            .iter()
            .filter(|(((_, user), _), _)| user.severity == Some(KILLED)),
    );
    SummaryStats {
        year: tables.year,
        total_accidents,
        total_deaths,
        joined_rows: complete.rows.len(),
        dropped_users: with_users.stats.unmatched_right,
        dropped_vehicles: complete.stats.unmatched_right,
    }
}

#[derive(Debug, Clone)]
pub struct LocationView {
    pub city: City,
    pub accidents: usize,
    pub points: Vec<PointRow>,
    /// Points carrying the coordinate sentinel. They are kept, since the
    /// map layer plots them, but reported as a data-quality gap.
    pub sentinel_points: usize,
}

/// Accidents of one city, selected by department code.
pub fn location_view(tables: &YearTables, city: &City) -> LocationView {
    let points: Vec<PointRow> = tables
        .characteristics
        .iter()
        .filter(|c| c.department == city.department)
        .map(|c| PointRow {
            accident_id: c.accident_id.clone(),
            lat: c.lat,
            lon: c.lon,
            sentinel: c.lat == COORD_SENTINEL || c.lon == COORD_SENTINEL,
        })
        .collect();
    let sentinel_points = points.iter().filter(|p| p.sentinel).count();
    if sentinel_points > 0 {
        info!(city = %city.name, sentinel_points, "city has accidents without usable coordinates");
    }
    LocationView {
        city: city.clone(),
        accidents: points.len(),
        points,
        sentinel_points,
    }
}

#[derive(Debug, Clone)]
pub struct TimeView {
    pub by_hour: Vec<SeverityCountRow>,
    pub by_month: Vec<SeverityCountRow>,
}

/// Person-level counts per hour of day and per calendar month.
pub fn time_view(tables: &YearTables, book: &Codebook) -> TimeView {
    let joined = inner_join(&tables.characteristics, &tables.users, "characteristics-users");

    let hours = grouped_counts(
        joined.rows.iter(),
        |(c, _)| Some(c.hour),
        |(_, u)| severity(book, u.severity),
    );
    // Grouping on the month code keeps calendar order.
    let months = grouped_counts(
        joined.rows.iter(),
        |(c, _)| mapped(book, Dimension::Month, c.month, &[]),
        |(_, u)| severity(book, u.severity),
    );
    TimeView {
        by_hour: severity_counts(book, &hours, |h| h.to_string()),
        by_month: severity_counts(book, &months, |m| book.label_or_code(Dimension::Month, *m)),
    }
}

#[derive(Debug, Clone)]
pub struct UsersView {
    pub sex_share: Vec<ShareRow>,
    pub gender_severity: Vec<GenderSeverityRow>,
    pub journey_counts: Vec<SeverityCountRow>,
    pub journey_share: Vec<ShareRow>,
    pub journey_normalized: Vec<SeverityShareRow>,
}

pub fn users_view(tables: &YearTables, book: &Codebook) -> UsersView {
    let joined = inner_join(&tables.users, &tables.locations, "users-locations");

    let sex = count_by(joined.rows.iter(), |(u, _)| {
        mapped(book, Dimension::Sex, u.sex, SEX_EXCLUDED)
    });
    let gender = grouped_counts(
        joined.rows.iter(),
        |(u, _)| mapped(book, Dimension::Sex, u.sex, SEX_EXCLUDED),
        |(u, _)| severity(book, u.severity),
    );
    let gender_severity = gender
        .rescale_by_share()
        .into_iter()
        .map(|r| GenderSeverityRow {
            sex: book.label_or_code(Dimension::Sex, r.category),
            severity: book.label_or_code(Dimension::Severity, r.value),
            count: r.count,
            population_share: r.population_share,
            rescaled_count: r.rescaled,
        })
        .collect();

    let journey = grouped_counts(
        joined.rows.iter(),
        |(u, _)| mapped(book, Dimension::Journey, u.journey, &[]),
        |(u, _)| severity(book, u.severity),
    );
    let journey_pie = count_by(joined.rows.iter(), |(u, _)| {
        mapped(book, Dimension::Journey, u.journey, &[])
    });
    let journey_label = |code: &i32| book.label_or_code(Dimension::Journey, *code);

    UsersView {
        sex_share: share_rows(book, Dimension::Sex, &sex),
        gender_severity,
        journey_counts: severity_counts(book, &journey, journey_label),
        journey_share: share_rows(book, Dimension::Journey, &journey_pie),
        journey_normalized: severity_shares(book, &journey, journey_label),
    }
}

#[derive(Debug, Clone)]
pub struct VehiclesView {
    pub impact_normalized: Vec<SeverityShareRow>,
    pub fixed_obstacles: Vec<ShareRow>,
    pub mobile_obstacles: Vec<ShareRow>,
}

fn obstacles_specified(book: &Codebook, v: &Vehicle) -> bool {
    let fixed = mapped(
        book,
        Dimension::FixedObstacle,
        v.fixed_obstacle,
        FIXED_OBSTACLE_EXCLUDED,
    );
    let mobile = mapped(
        book,
        Dimension::MobileObstacle,
        v.mobile_obstacle,
        MOBILE_OBSTACLE_EXCLUDED,
    );
    fixed.is_some() && mobile.is_some()
}

pub fn vehicles_view(tables: &YearTables, book: &Codebook) -> VehiclesView {
    let joined = inner_join(&tables.vehicles, &tables.users, "vehicles-users");

    let impact = grouped_counts(
        joined.rows.iter(),
        |(v, _)| mapped(book, Dimension::Impact, v.impact, IMPACT_EXCLUDED),
        |(_, u)| severity(book, u.severity),
    );

    // Both obstacle pies share one filter: a row must have a fixed and a
    // mobile obstacle that are both specified.
    let struck: Vec<_> = joined
        .rows
        .iter()
        .filter(|(v, _)| obstacles_specified(book, v))
        .collect();
    let fixed = count_by(struck.iter(), |(v, _)| v.fixed_obstacle);
    let mobile = count_by(struck.iter(), |(v, _)| v.mobile_obstacle);

    VehiclesView {
        impact_normalized: severity_shares(book, &impact, |c| {
            book.label_or_code(Dimension::Impact, *c)
        }),
        fixed_obstacles: share_rows(book, Dimension::FixedObstacle, &fixed),
        mobile_obstacles: share_rows(book, Dimension::MobileObstacle, &mobile),
    }
}

#[derive(Debug, Clone)]
pub struct RoadsView {
    pub surface_counts: Vec<SeverityCountRow>,
    pub surface_share: Vec<ShareRow>,
    pub surface_normalized: Vec<SeverityShareRow>,
    pub vma_normalized: Vec<SeverityShareRow>,
    pub lighting_share: Vec<ShareRow>,
    pub lighting_normalized: Vec<SeverityShareRow>,
}

pub fn roads_view(tables: &YearTables, book: &Codebook) -> RoadsView {
    let with_locations = inner_join(&tables.users, &tables.locations, "users-locations");
    let joined = inner_join(
        &with_locations.rows,
        &tables.characteristics,
        "locations-characteristics",
    );

    let surface = grouped_counts(
        joined.rows.iter(),
        |((_, l), _)| mapped(book, Dimension::Surface, l.surface, SURFACE_EXCLUDED),
        |((u, _), _)| severity(book, u.severity),
    );
    let surface_pie = count_by(joined.rows.iter(), |((_, l), _)| {
        mapped(book, Dimension::Surface, l.surface, SURFACE_EXCLUDED)
    });

    let vma = grouped_counts(
        joined.rows.iter(),
        |((_, l), _)| l.speed_limit.filter(|v| (1..VMA_CEILING).contains(v)),
        |((u, _), _)| severity(book, u.severity),
    );

    let lighting = grouped_counts(
        joined.rows.iter(),
        |(_, c)| mapped(book, Dimension::Lighting, c.lighting, &[]),
        |((u, _), _)| severity(book, u.severity),
    );
    let lighting_pie = count_by(joined.rows.iter(), |(_, c)| {
        mapped(book, Dimension::Lighting, c.lighting, &[])
    });

    let surface_label = |c: &i32| book.label_or_code(Dimension::Surface, *c);
    RoadsView {
        surface_counts: severity_counts(book, &surface, surface_label),
        surface_share: share_rows(book, Dimension::Surface, &surface_pie),
        surface_normalized: severity_shares(book, &surface, surface_label),
        vma_normalized: severity_shares(book, &vma, |v| v.to_string()),
        lighting_share: share_rows(book, Dimension::Lighting, &lighting_pie),
        lighting_normalized: severity_shares(book, &lighting, |c| {
            book.label_or_code(Dimension::Lighting, *c)
        }),
    }
}

#[derive(Debug, Clone)]
pub struct TrendView {
    pub by_year: Vec<YearCountRow>,
    pub by_year_severity: Vec<SeverityCountRow>,
}

/// Year-over-year evolution. Rows are person-level (characteristics merged
/// with users); `accidents` is the unique-id count of the same rows. The
/// year comes from the `an` column, falling back to the file's year, so
/// several files may feed the same year.
pub fn trend_view(slices: &[TrendSlice], book: &Codebook) -> TrendView {
    let mut per_year: BTreeMap<i32, (usize, HashSet<&str>)> = BTreeMap::new();
    let mut severity_tally: Tally<i32, i32> = Tally {
        cells: BTreeMap::new(),
        excluded: 0,
    };
    for slice in slices {
        let joined = inner_join(&slice.characteristics, &slice.users, "trend");
        let year_of = |c: &Characteristics| c.year.unwrap_or(slice.year);

        for &(c, _) in &joined.rows {
            let (rows, ids) = per_year.entry(year_of(c)).or_default();
            *rows += 1;
            ids.insert(c.accident_id.as_str());
        }

        let tally = grouped_counts(
            joined.rows.iter(),
            |(c, _)| Some(year_of(*c)),
            |(_, u)| severity(book, u.severity),
        );
        for (key, count) in tally.cells {
            *severity_tally.cells.entry(key).or_insert(0) += count;
        }
        severity_tally.excluded += tally.excluded;
    }

    TrendView {
        by_year: per_year
            .into_iter()
            .map(|(year, (rows, ids))| YearCountRow {
                year,
                rows,
                accidents: ids.len(),
            })
            .collect(),
        by_year_severity: severity_counts(book, &severity_tally, |y| y.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct DataInfo {
    pub shapes: Vec<TableShapeRow>,
    pub missing: Vec<ColumnProfileRow>,
    pub heads: Vec<TableHead>,
}

/// First rows of one cleaned table, as text.
#[derive(Debug, Clone)]
pub struct TableHead {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Shape, missing values and first rows of every cleaned table.
pub fn data_info(report: &LoadReport) -> DataInfo {
    let shapes = report
        .profiles
        .iter()
        .map(|p| TableShapeRow {
            table: p.name.clone(),
            rows: p.rows,
            columns: p.columns.len(),
        })
        .collect();
    let missing = report
        .profiles
        .iter()
        .flat_map(|p| {
            p.columns
                .iter()
                .zip(&p.missing_per_column)
                .map(move |(col, missing)| ColumnProfileRow {
                    table: p.name.clone(),
                    column: col.clone(),
                    missing: *missing,
                })
        })
        .collect();
    let heads = report
        .profiles
        .iter()
        .map(|p| TableHead {
            table: p.name.clone(),
            columns: p.columns.clone(),
            rows: p.head.clone(),
        })
        .collect();
    DataInfo {
        shapes,
        missing,
        heads,
    }
}
