use clap::{Arg, Command};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let matches = Command::new("NYC Taxi Ingestion")
        .version("1.0")
        .about("Loads monthly TLC trip files into the warehouse")
        .subcommand(
            Command::new("load")
                .about("Run the batch loader over the configured data directory")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("load", load_matches)) => {
            let config_path = load_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/ingest.toml");

            match ingest::run_ingestion_pipeline(config_path).await {
                Ok(stats) => match serde_json::to_string_pretty(&stats) {
                    Ok(summary) => println!("{}", summary),
                    Err(e) => eprintln!("Failed to serialize run summary: {}", e),
                },
                Err(e) => {
                    eprintln!("Ingestion run error: {}", e);
                    process::exit(1);
                }
            }
        }

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
