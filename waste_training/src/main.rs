use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use waste_training::{config::get_configuration, pipeline};

const USAGE: &str =
    "usage: waste_training [prepare | review <history.csv> | evaluate <predictions.csv> | publish]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_configuration()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_level.as_str())
        }))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("prepare") => {
            pipeline::prepare(&config)?;
        }
        Some("review") => {
            let history = args.next().map(PathBuf::from).ok_or(USAGE)?;
            let summary = pipeline::review(&config, &history)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some("evaluate") => {
            let predictions = args.next().map(PathBuf::from).ok_or(USAGE)?;
            let report = pipeline::evaluate(&config, &predictions)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some("publish") => {
            pipeline::release(&config)?;
        }
        Some(other) => {
            tracing::error!("Unknown command `{}`", other);
            return Err(USAGE.into());
        }
    }

    Ok(())
}
