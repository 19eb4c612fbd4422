use std::env;

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SIMDEX_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();
    std::process::exit(simdex::cli::run_with_args(&args));
}
