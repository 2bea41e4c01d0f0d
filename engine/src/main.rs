//! Slipway - Entry Point
//!
//! A deployment execution engine: builds a pinned commit inside an isolated
//! container, ships the artifacts to a target host over SSH, and streams the
//! live log to stdout until the deployment reaches a terminal status.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use slipway::app::options::AppOptions;
use slipway::app::run::run;
use slipway::logs::{init_logging, LogOptions};
use slipway::models::deployment::TriggerSource;
use slipway::storage::settings::Settings;
use slipway::trigger::TriggerRequest;
use slipway::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Retrieve the settings file; a missing default file falls back to
    // built-in defaults, an explicit --config must exist
    let config_path = cli_args
        .get("config")
        .map(String::as_str)
        .unwrap_or("slipway.json");
    let settings = if Path::new(config_path).exists() {
        match Settings::load(Path::new(config_path)).await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                std::process::exit(2);
            }
        }
    } else if cli_args.contains_key("config") {
        eprintln!("Settings file not found: {}", config_path);
        std::process::exit(2);
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    // Resolve the project and commit to deploy
    let Some(project_key) = cli_args.get("project") else {
        eprintln!("Usage: slipway --project=<id|name> --commit=<hash> [--branch=<name>] [--config=<path>]");
        std::process::exit(2);
    };
    let Some(commit_hash) = cli_args.get("commit") else {
        eprintln!("Missing required argument: --commit=<hash>");
        std::process::exit(2);
    };
    let Some(project) = settings.find_project(project_key) else {
        eprintln!("Unknown project: {}", project_key);
        std::process::exit(2);
    };

    let request = TriggerRequest {
        project_id: project.id,
        commit_hash: commit_hash.clone(),
        commit_message: cli_args.get("message").cloned(),
        author: cli_args.get("author").cloned(),
        branch: cli_args
            .get("branch")
            .cloned()
            .unwrap_or_else(|| "main".to_string()),
        source: TriggerSource::Manual,
        payload: None,
    };

    let options = AppOptions::from_settings(&settings);
    info!(
        "Running slipway {} for project {} on {}",
        version.version, project.name, project.target_host
    );

    match run(options, settings.projects.clone(), request).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Failed to run the deployment: {e}");
            std::process::exit(1);
        }
    }
}
