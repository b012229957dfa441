//! Process configuration read from the environment

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Root that patient document paths are relative to
    pub anamnesis_dir: PathBuf,
    /// JSON file with patient files loaded into an empty store
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("SYMPTEX_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let db_path = lookup("SYMPTEX_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".symptex").join("symptex.db")
            },
            PathBuf::from,
        );

        let anamnesis_dir =
            lookup("ANAMNESIS_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from);

        Self {
            port,
            db_path,
            anamnesis_dir,
            seed_file: lookup("SYMPTEX_SEED_FILE")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}
