// Entry point and high-level CLI flow.
//
// - `info`, `report` and `trend` run a single view non-interactively.
// - With no subcommand the binary falls back to the menu loop: pick a view,
//   pick a year, read the previews, go back or exit.
// Every action reloads the yearly CSVs; nothing is kept between actions.
mod aggregate;
mod codebook;
mod config;
mod error;
mod join;
mod loader;
mod output;
mod reports;
mod types;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codebook::Codebook;
use config::Settings;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "French road accident data preparation", long_about = None)]
struct Cli {
    /// JSON settings file (data/output dirs, year ranges, cities)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding one sub-directory of CSV extracts per year
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Where CSV/JSON results are written
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Code → label tables; the embedded copy is used when omitted
    #[arg(long)]
    codebook: Option<PathBuf>,
    /// Which distribution shape the previews show (both are always exported)
    #[arg(long, value_enum, default_value_t = ViewMode::Normalized)]
    mode: ViewMode,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shape and missing values of the four tables of a year
    Info {
        #[arg(long)]
        year: i32,
    },
    /// Every per-year view, exported and previewed
    Report {
        #[arg(long)]
        year: i32,
        /// City for the location view
        #[arg(long, default_value = "Paris")]
        city: String,
    },
    /// Year-over-year evolution over the configured trend range
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewMode {
    Raw,
    Normalized,
}

struct App {
    settings: Settings,
    codebook: Codebook,
    mode: ViewMode,
}

/// Read one trimmed line after printing `prompt`. `None` on end of input.
fn read_input(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_year(app: &App) -> Option<i32> {
    let range = app.settings.supported_years;
    loop {
        let input = read_input(&format!("Select a year ({}-{}): ", range.first, range.last))?;
        match input.parse::<i32>() {
            Ok(y) if range.contains(y) => return Some(y),
            _ => println!("Invalid year. Please enter a year between {} and {}.", range.first, range.last),
        }
    }
}

fn read_city(app: &App) -> Option<String> {
    let names: Vec<&str> = app.settings.cities.iter().map(|c| c.name.as_str()).collect();
    loop {
        let input = read_input(&format!("Choose a city ({}): ", names.join(", ")))?;
        if app.settings.city(&input).is_ok() {
            return Some(input);
        }
        println!("Unknown city. Please pick one of: {}.", names.join(", "));
    }
}

/// Ask whether to go back to the view selection menu.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        let Some(resp) = read_input("Back to View Selection (Y/N): ") else {
            return false;
        };
        match resp.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_summary(load_report: &loader::LoadReport, accidents: usize) {
    println!(
        "Processing dataset... ({} rows read, {} accidents kept for {})",
        util::format_int(load_report.total_rows),
        util::format_int(accidents),
        load_report.year
    );
    if load_report.parse_errors > 0 {
        println!(
            "Note: {} rows skipped due to parse/validation errors.",
            util::format_int(load_report.parse_errors)
        );
    }
}

fn handle_info(app: &App, year: i32) -> Result<()> {
    let (tables, load_report) = loader::load_year(&app.settings, year)
        .with_context(|| format!("loading {} extracts", year))?;
    print_load_summary(&load_report, tables.characteristics.len());
    if load_report.sentinel_coords > 0 {
        println!(
            "Info: {} accidents have unreadable coordinates (stored as {}).",
            util::format_int(load_report.sentinel_coords),
            util::COORD_SENTINEL
        );
    }
    if let (Some(first), Some(last)) = (load_report.first_date, load_report.last_date) {
        println!("Accident dates span {} to {}.", first, last);
    }
    println!();

    let info = reports::data_info(&load_report);
    let dir = app.settings.output_dir.join(year.to_string());
    output::export(&dir, "data_info_shapes", &info.shapes)?;
    let missing = output::export(&dir, "data_info_missing", &info.missing)?;
    output::preview_table("Data Presentation", None, &info.shapes, info.shapes.len());
    output::preview_table(
        "Missing values per column",
        Some("first 15 columns"),
        &info.missing,
        15,
    );
    println!("(Full table exported to {})\n", missing.display());

    for head in &info.heads {
        output::export_grid(
            &dir,
            &format!("data_info_head_{}", head.table),
            &head.columns,
            &head.rows,
        )?;
        println!("First rows of {}\n", head.table);
        println!("{}\n", output::render_grid(&head.columns, &head.rows));
    }
    Ok(())
}

fn handle_report(app: &App, year: i32, city_name: &str) -> Result<()> {
    let city = app.settings.city(city_name)?;
    let (tables, load_report) = loader::load_year(&app.settings, year)
        .with_context(|| format!("loading {} extracts", year))?;
    print_load_summary(&load_report, tables.characteristics.len());
    let book = &app.codebook;
    let dir = app.settings.output_dir.join(year.to_string());
    let normalized = app.mode == ViewMode::Normalized;

    println!("Generating reports...");
    println!("Outputs saved to {}\n", dir.display());

    let summary = reports::generate_summary(&tables);
    output::write_json(&dir.join("summary.json"), &summary)?;
    println!(
        "Total Accidents: {}    Total Deaths: {}\n",
        util::format_int(summary.total_accidents),
        util::format_int(summary.total_deaths)
    );

    let location = reports::location_view(&tables, city);
    let location_name = format!("location_{}", location.city.name.to_lowercase());
    output::export(&dir, &location_name, &location.points)?;
    output::write_json(
        &dir.join(format!("{}_centre.json", location_name)),
        &location.city,
    )?;
    println!(
        "Map centre for {}: ({}, {})",
        location.city.name, location.city.lat, location.city.lon
    );
    println!(
        "Number of accidents in {} : {} ({} without usable coordinates)\n",
        location.city.name,
        util::format_int(location.accidents),
        util::format_int(location.sentinel_points)
    );

    let time = reports::time_view(&tables, book);
    output::export(&dir, "time_by_hour", &time.by_hour)?;
    output::export(&dir, "time_by_month", &time.by_month)?;
    output::preview_table("Number of accidents by hour", None, &time.by_hour, 8);

    let users = reports::users_view(&tables, book);
    output::export(&dir, "users_sex_share", &users.sex_share)?;
    output::export(&dir, "users_gender_severity", &users.gender_severity)?;
    output::export(&dir, "users_journey_counts", &users.journey_counts)?;
    output::export(&dir, "users_journey_share", &users.journey_share)?;
    output::export(&dir, "users_journey_normalized", &users.journey_normalized)?;
    output::preview_table(
        "Accident Distribution by Gender",
        Some("rescaled by population share"),
        &users.gender_severity,
        8,
    );
    if normalized {
        output::preview_table(
            "Normalized Distribution of Journey Reasons by Injury Severity",
            None,
            &users.journey_normalized,
            8,
        );
    } else {
        output::preview_table(
            "Distribution of Journey Reasons with Injury Severity",
            None,
            &users.journey_counts,
            8,
        );
    }

    let vehicles = reports::vehicles_view(&tables, book);
    output::export(&dir, "vehicles_impact_normalized", &vehicles.impact_normalized)?;
    output::export(&dir, "vehicles_fixed_obstacles", &vehicles.fixed_obstacles)?;
    output::export(&dir, "vehicles_mobile_obstacles", &vehicles.mobile_obstacles)?;
    output::preview_table(
        "Accident severity by point of impact",
        None,
        &vehicles.impact_normalized,
        8,
    );

    let roads = reports::roads_view(&tables, book);
    output::export(&dir, "roads_surface_counts", &roads.surface_counts)?;
    output::export(&dir, "roads_surface_share", &roads.surface_share)?;
    output::export(&dir, "roads_surface_normalized", &roads.surface_normalized)?;
    output::export(&dir, "roads_vma_normalized", &roads.vma_normalized)?;
    output::export(&dir, "roads_lighting_share", &roads.lighting_share)?;
    output::export(&dir, "roads_lighting_normalized", &roads.lighting_normalized)?;
    if normalized {
        output::preview_table(
            "Normalized accident distribution by road condition",
            None,
            &roads.surface_normalized,
            8,
        );
    } else {
        output::preview_table(
            "Accident distribution by road condition",
            None,
            &roads.surface_counts,
            8,
        );
    }
    output::preview_table(
        "Distribution of accidents by lighting conditions",
        None,
        &roads.lighting_share,
        5,
    );

    info!(year, output = %dir.display(), "reports written");
    Ok(())
}

fn handle_trend(app: &App) -> Result<()> {
    let slices = loader::load_trend(&app.settings).context("loading trend extracts")?;
    let trend = reports::trend_view(&slices, &app.codebook);
    let dir = app.settings.output_dir.join("trend");
    output::export(&dir, "trend_by_year", &trend.by_year)?;
    output::export(&dir, "trend_by_year_severity", &trend.by_year_severity)?;
    output::preview_table(
        "Evolution of Number of Accidents by Year",
        None,
        &trend.by_year,
        trend.by_year.len(),
    );
    output::preview_table(
        "Evolution of Accident Severity by Year",
        None,
        &trend.by_year_severity,
        12,
    );
    Ok(())
}

fn run_menu(app: &App) {
    loop {
        println!("Select a view:");
        println!("[1] Data info");
        println!("[2] Generate Reports");
        println!("[3] Yearly evolution\n");
        let Some(choice) = read_input("Enter choice: ") else {
            break;
        };
        let outcome = match choice.as_str() {
            "1" => match read_year(app) {
                Some(year) => handle_info(app, year),
                None => break,
            },
            "2" => {
                let Some(year) = read_year(app) else { break };
                let Some(city) = read_city(app) else { break };
                println!();
                let res = handle_report(app, year, &city);
                if let Err(e) = &res {
                    eprintln!("Failed to generate reports: {:#}\n", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
                continue;
            }
            "3" => handle_trend(app),
            _ => {
                println!("Invalid choice. Please enter 1, 2 or 3.\n");
                continue;
            }
        };
        if let Err(e) = outcome {
            eprintln!("Error: {:#}\n", e);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut settings = Settings::load(cli.config.as_deref()).context("reading settings")?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        settings.output_dir = dir;
    }
    let codebook = match &cli.codebook {
        Some(path) => Codebook::from_path(path)
            .with_context(|| format!("reading codebook {}", path.display()))?,
        None => Codebook::embedded().clone(),
    };
    info!(codebook = %codebook.version, data_dir = %settings.data_dir.display(), "starting");

    let app = App {
        settings,
        codebook,
        mode: cli.mode,
    };
    match cli.command {
        Some(Command::Info { year }) => handle_info(&app, year),
        Some(Command::Report { year, city }) => handle_report(&app, year, &city),
        Some(Command::Trend) => handle_trend(&app),
        None => {
            run_menu(&app);
            Ok(())
        }
    }
}
