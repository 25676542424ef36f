use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use cellway::{
    BoundingBox, CalculationTicket, CellwayConfig, Coordinate, RouteEndpoints, RouteResult,
    RouteSelector, RouteType, telemetry, web,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute route variants between two "lat,lng" points
    Route {
        #[arg(allow_hyphen_values = true)]
        start: String,
        #[arg(allow_hyphen_values = true)]
        end: String,
        /// Variant to show in detail
        #[arg(long, default_value = "fastest")]
        variant: RouteType,
    },
    /// List cell towers inside a bounding box
    Towers {
        #[arg(allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(allow_hyphen_values = true)]
        min_lng: f64,
        #[arg(allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(allow_hyphen_values = true)]
        max_lng: f64,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = CellwayConfig::load_from_path(args.config)?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    telemetry::init(&config.logging)?;

    let selector = Arc::new(RouteSelector::from_config(&config)?);

    match args.command {
        Command::Route {
            start,
            end,
            variant,
        } => {
            let endpoints = RouteEndpoints::new(Coordinate::parse(&start)?, Coordinate::parse(&end)?);
            let outcome = match selector
                .compute_all_variants(endpoints, &CalculationTicket::detached(), |_| {})
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Err(e.into());
                }
            };

            for route_type in RouteType::ALL {
                match outcome.variants.get(route_type) {
                    Some(result) => print_summary(result),
                    None => println!(
                        "{:<14} unavailable: {}",
                        route_type,
                        outcome
                            .failures
                            .get(&route_type)
                            .map_or("unknown error", String::as_str)
                    ),
                }
            }

            if let Some(shown) = outcome.variants.get_or_fastest(variant) {
                if shown.route_type != variant {
                    println!("\n{variant} is unavailable, showing {}", shown.route_type);
                }
                println!("\nClosest towers along the {} route:", shown.route_type);
                for scored in shown.towers.iter().take(10) {
                    println!(
                        "  {:>6.0} m  {:?}  {}",
                        scored.distance_to_route_meters,
                        scored.tower.radio_type,
                        scored
                            .tower
                            .average_signal_dbm
                            .map_or("n/a".to_string(), |dbm| format!("{dbm} dBm"))
                    );
                }
            }
        }
        Command::Towers {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
        } => {
            let bounds = BoundingBox {
                min_lat,
                min_lng,
                max_lat,
                max_lng,
            };
            let towers = selector.towers_in(&bounds).await?;
            println!("{}", serde_json::to_string_pretty(&towers)?);
        }
        Command::Serve { port } => {
            web::run(port, selector).await?;
        }
    }

    Ok(())
}

fn print_summary(result: &RouteResult) {
    println!(
        "{:<14} {:>8.1} km {:>6.0} min  score {:.2}/5  ({} towers)",
        result.route_type,
        result.distance_meters / 1000.0,
        result.duration_seconds / 60.0,
        result.signal_score,
        result.tower_count
    );
}
