/// Centralized argument handling for MintScout
///
/// Consolidates all command-line argument parsing and debug flag checking so
/// the rest of the codebase never touches `env::args()` directly.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
/// Thread-safe singleton that stores arguments for access throughout the application
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

/// Discovery sources debug mode
pub fn is_debug_discovery_enabled() -> bool {
    has_arg("--debug-discovery")
}

/// Firehose (logsSubscribe) debug mode
pub fn is_debug_firehose_enabled() -> bool {
    has_arg("--debug-firehose")
}

/// HTTP/API calls debug mode
pub fn is_debug_api_enabled() -> bool {
    has_arg("--debug-api")
}

/// Intake pipeline debug mode
pub fn is_debug_intake_enabled() -> bool {
    has_arg("--debug-intake")
}

/// Scoring engine debug mode
pub fn is_debug_scoring_enabled() -> bool {
    has_arg("--debug-scoring")
}

/// Re-analysis scheduler debug mode
pub fn is_debug_reanalysis_enabled() -> bool {
    has_arg("--debug-reanalysis")
}

/// Dispatch scheduler debug mode
pub fn is_debug_dispatch_enabled() -> bool {
    has_arg("--debug-dispatch")
}

/// Database layer debug mode
pub fn is_debug_database_enabled() -> bool {
    has_arg("--debug-database")
}

/// Verbose mode - very detailed tracing everywhere
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose")
}

/// Help request
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Print command-line help
pub fn print_help() {
    println!("MintScout - Solana token discovery and triage daemon");
    println!();
    println!("USAGE:");
    println!("  mintscout [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("  --help, -h            Show this help message");
    println!("  --verbose             Enable verbose logging everywhere");
    println!("  --debug-discovery     Debug logs for aggregator/stream discovery");
    println!("  --debug-firehose      Debug logs for logsSubscribe firehose");
    println!("  --debug-api           Debug logs for outbound HTTP calls");
    println!("  --debug-intake        Debug logs for the intake worker");
    println!("  --debug-scoring       Debug logs for the scoring engine");
    println!("  --debug-reanalysis    Debug logs for the re-analysis scheduler");
    println!("  --debug-dispatch      Debug logs for the dispatch scheduler");
    println!("  --debug-database      Debug logs for the persistence layer");
    println!();
    println!("Secrets and chat targets are read from the environment:");
    println!("  TELEGRAM_TOKEN, PUBLIC_CHAT_ID, VIP_CHAT_ID,");
    println!("  HELIUS_API_KEY, BIRDEYE_API_KEY, RUGCHECK_JWT, BITQUERY_API_KEY,");
    println!("  X_BEARER_TOKEN, SYNDICA_RPC_URL, SYNDICA_WS_URL,");
    println!("  ALCHEMY_RPC_URL, ALCHEMY_WS_URL");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_value_extraction() {
        set_cmd_args(vec![
            "mintscout".to_string(),
            "--config".to_string(),
            "custom.toml".to_string(),
        ]);
        assert_eq!(get_arg_value("--config"), Some("custom.toml".to_string()));
        assert_eq!(get_arg_value("--missing"), None);
        assert!(has_arg("--config"));
        assert!(!has_arg("--verbose"));
    }
}
