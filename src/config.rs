use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration, from flags or `SHOWROOM_*` environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "showroom", about = "Tile showroom sales and billing service")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "SHOWROOM_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory holding users.json, store.bin.gz and uploaded chits
    #[arg(long, env = "SHOWROOM_DATA_DIR", default_value = "database")]
    pub data_dir: PathBuf,

    /// How long a sign-in stays valid
    #[arg(long, env = "SHOWROOM_SESSION_HOURS", default_value_t = 24)]
    pub session_hours: u64,

    /// Email of the admin account created at start-up if missing
    #[arg(long, env = "SHOWROOM_ADMIN_EMAIL", requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(long, env = "SHOWROOM_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[arg(long, env = "SHOWROOM_ADMIN_NAME", default_value = "Admin")]
    pub admin_name: String,

    /// Load the demo tiles when the catalog is empty
    #[arg(long, env = "SHOWROOM_SEED_CATALOG")]
    pub seed_catalog: bool,
}

impl Config {
    /// Defaults with everything stored under `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: data_dir.as_ref().to_path_buf(),
            session_hours: 24,
            admin_email: None,
            admin_password: None,
            admin_name: "Admin".to_string(),
            seed_catalog: false,
        }
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.bin.gz")
    }

    pub fn chits_dir(&self) -> PathBuf {
        self.data_dir.join("chits")
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_hours * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from([
            "showroom",
            "--bind",
            "0.0.0.0:8080",
            "--data-dir",
            "/var/lib/showroom",
            "--session-hours",
            "8",
            "--seed-catalog",
        ]);
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/showroom/store.bin.gz"));
        assert_eq!(config.session_ttl(), Duration::from_secs(8 * 3600));
        assert!(config.seed_catalog);
    }

    #[test]
    fn admin_email_needs_password() {
        let result = Config::try_parse_from(["showroom", "--admin-email", "admin@example.com"]);
        assert!(result.is_err());
    }
}
