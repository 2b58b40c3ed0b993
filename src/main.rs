use mintscout::{
    arguments::{is_help_requested, print_help},
    logger::{self, LogTag},
};

/// Main entry point for MintScout
///
/// Headless daemon: discovery streams, pollers, the analysis pipeline and the
/// Telegram push scheduler all run as background tasks until Ctrl-C.
#[tokio::main]
async fn main() {
    // Ensure all directories exist BEFORE logger initialization
    // (logger needs the logs directory to create log files)
    if let Err(e) = mintscout::paths::ensure_all_directories() {
        eprintln!("Failed to create required directories: {}", e);
        std::process::exit(1);
    }

    logger::init();

    if is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    logger::info(LogTag::System, "MintScout starting up...");

    match mintscout::run::run_bot().await {
        Ok(_) => {
            logger::info(LogTag::System, "MintScout shut down cleanly");
        }
        Err(e) => {
            logger::error(LogTag::System, &format!("MintScout failed: {}", e));
            std::process::exit(1);
        }
    }
}
