use std::process::ExitCode;
use tracing::{error, info};
use upstreamgen::config::{locate_config, Config};
use upstreamgen::generator::Generator;
use upstreamgen::inspect::CommandInspector;

const USAGE: &str = "\
NGINX Upstream Config Generator
    --help                show this message
    [config location]     location for the config. default is \"./config.json\"

when no arguments are provided, it will run with the config at \"./config.json\".
config files ending in .toml are read as TOML, anything else as JSON.";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("upstreamgen=info".parse().expect("valid log directive")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if wants_help(&args) {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let config_path = match locate_config(&args) {
        Ok(path) => path,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path.display(), exit_code = e.exit_code(), "{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    info!(
        path = %config_path.display(),
        items = config.items.len(),
        runtime = %config.runtime.join(" "),
        "Configuration loaded"
    );

    let inspector = CommandInspector::new(config.runtime_program(), config.runtime_args());
    match Generator::new(inspector).run(&config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(item = ?e.item_index(), exit_code = e.exit_code(), "{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn wants_help(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "--help" || arg == "-h")
}
