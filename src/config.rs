// Configuration
// Settings shared by the CLI and the API server. Every flag has an env fallback.

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::workflow::TransitionPolicy;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite database file
    #[arg(long = "db", env = "POULTRY_DB", default_value = "poultry22.db")]
    pub db_path: PathBuf,

    /// Address the API server listens on
    #[arg(long, env = "POULTRY_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Directory holding the storage buckets
    #[arg(long = "storage", env = "POULTRY_STORAGE", default_value = "storage")]
    pub storage_root: PathBuf,

    /// How loan status changes are checked
    #[arg(long, env = "POULTRY_TRANSITIONS", value_enum, default_value_t = TransitionPolicy::Permissive)]
    pub transitions: TransitionPolicy,

    /// Emit logs as JSON lines
    #[arg(long, env = "POULTRY_LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["poultry22"]).unwrap();
        assert_eq!(cli.settings.bind.port(), 3000);
        assert_eq!(cli.settings.transitions, TransitionPolicy::Permissive);
        assert!(!cli.settings.log_json);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "poultry22",
            "--db",
            "/tmp/farm.db",
            "--transitions",
            "forward-only",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(cli.settings.db_path, PathBuf::from("/tmp/farm.db"));
        assert_eq!(cli.settings.transitions, TransitionPolicy::ForwardOnly);
        assert!(cli.settings.log_json);
    }
}
