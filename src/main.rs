use anyhow::Result;
use clap::Parser;

use nimbus_core::{AppError, Config};
use nimbus_weather::{
    FormattedDataPoint, LoadOutcome, Location, LocationSetting, SettingsPatch, UnitSystem,
    WeatherStore,
};

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Show the weather for where you are")]
struct Cli {
    /// Refresh even if the cached forecast is still fresh
    #[arg(short, long)]
    force: bool,

    /// Unit system to request (us, si, ca, uk2, auto); saved for next time
    #[arg(short, long, value_name = "UNITS")]
    units: Option<UnitSystem>,

    /// Use a fixed location instead of the current position; saved for next time
    #[arg(long, value_name = "LAT,LON", value_parser = parse_coordinates)]
    at: Option<(f64, f64)>,
}

fn parse_coordinates(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| "expected LAT,LON".to_string())?;
    let lat = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    let lon = lon.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    Ok((lat, lon))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    nimbus_core::init()?;

    let (config, _) = Config::load_validated().map_err(|e| {
        let err = AppError::from(e);
        eprintln!("{}", err.user_message());
        err
    })?;
    let store = WeatherStore::open(&config).map_err(AppError::from)?;

    let mut patch = SettingsPatch::default();
    if let Some(units) = args.units {
        patch = patch.units(units);
    }
    if let Some((lat, lon)) = args.at {
        patch = patch.location(LocationSetting::Explicit(Location::at(lat, lon)));
    }
    if args.units.is_some() || args.at.is_some() {
        store
            .update_settings(patch)
            .map_err(|e| AppError::Storage(e.into()))?;
        // settings changed, so whatever is cached no longer applies
        store.clear_last_updated();
    }

    if args.force {
        store.clear_last_updated();
    }

    match store.load().await {
        Ok(LoadOutcome::Refreshed) => tracing::debug!("Forecast refreshed"),
        Ok(LoadOutcome::Fresh) => tracing::debug!("Using cached forecast"),
        Ok(LoadOutcome::NoCoordinates) => {
            eprintln!("No usable location. Try --at LAT,LON.");
        }
        Err(e) => {
            let err = AppError::from(e);
            eprintln!("{}", err.user_message());
            if store.forecast().is_none() {
                return Err(err.into());
            }
            eprintln!("Showing the last known forecast.\n");
        }
    }

    print_report(&store);
    Ok(())
}

fn print_report(store: &WeatherStore) {
    let Some(current) = store.current() else {
        println!("No forecast yet.");
        return;
    };

    let place = store
        .location()
        .map(|l| l.display_name())
        .unwrap_or_else(|| "Unknown location".to_string());
    println!("{}", place);
    if let Some(at) = store.last_updated() {
        println!("Updated {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    println!();

    print_current(&current);

    if let Some(days) = store.daily() {
        println!();
        for day in &days {
            print_day(day);
        }
    }
}

fn print_current(current: &FormattedDataPoint) {
    if let Some(summary) = current.get("summary") {
        println!("  {}", summary);
    }
    for (label, field) in [
        ("Temperature", "temperature"),
        ("Feels like", "apparentTemperature"),
        ("Humidity", "humidity"),
        ("Wind", "windSpeed"),
        ("Precipitation", "precipProbability"),
    ] {
        if let Some(value) = current.get(field) {
            println!("  {:<14}{}", label, value);
        }
    }
}

fn print_day(day: &FormattedDataPoint) {
    let date = day
        .time
        .map(|t| t.format("%a %d %b").to_string())
        .unwrap_or_default();
    let high = day.get("temperatureHigh").unwrap_or("-");
    let low = day.get("temperatureLow").unwrap_or("-");
    let summary = day.get("summary").unwrap_or("");
    println!("  {:<11}{:>6} /{:>6}  {}", date, high, low, summary);
}
