use foot_traffic::app;
use foot_traffic::config::DashboardConfig;

use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    // Optional configuration file; defaults serve the basic dashboard
    let config = match args.get(1) {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };

    // Start the web application
    app::run(config).await?;

    Ok(())
}
