use std::path::PathBuf;

use serde::Deserialize;
use trackdb_dispatch::{DispatchConfig, ReentrancyPolicy, ShutdownPolicy};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    dispatch: DispatchSection,
    #[serde(default)]
    library: LibrarySection,
}

#[derive(Deserialize, Default)]
struct DispatchSection {
    queue_capacity: Option<usize>,
    shutdown_policy: Option<String>,
    reentrancy: Option<String>,
    worker_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct LibrarySection {
    database: Option<String>,
}

pub struct Config {
    dispatch: DispatchSection,
    library: LibrarySection,
}

impl Config {
    /// Embedded defaults, overridden field by field by the user's file.
    pub fn load() -> Self {
        let mut config = Self::from_embedded();
        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => config.merge_str(&contents, &path.display().to_string()),
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }
        config
    }

    fn from_embedded() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        Config {
            dispatch: base.dispatch,
            library: base.library,
        }
    }

    /// Apply overrides from TOML text. Malformed input is logged and ignored.
    fn merge_str(&mut self, contents: &str, origin: &str) {
        match toml::from_str::<ConfigFile>(contents) {
            Ok(user) => {
                merge_dispatch(&mut self.dispatch, user.dispatch);
                merge_library(&mut self.library, user.library);
            }
            Err(e) => log::warn!(target: "config", "ignoring malformed config {}: {}", origin, e),
        }
    }

    pub fn dispatch(&self) -> DispatchConfig {
        let fallback = DispatchConfig::default();
        let mut config = DispatchConfig::default()
            .queue_capacity(self.dispatch.queue_capacity.unwrap_or(fallback.queue_capacity));
        if let Some(policy) = self.dispatch.shutdown_policy.as_deref() {
            match policy.parse::<ShutdownPolicy>() {
                Ok(policy) => config = config.shutdown_policy(policy),
                Err(e) => log::warn!(target: "config", "{}; using {:?}", e, fallback.shutdown_policy),
            }
        }
        if let Some(policy) = self.dispatch.reentrancy.as_deref() {
            match policy.parse::<ReentrancyPolicy>() {
                Ok(policy) => config = config.reentrancy(policy),
                Err(e) => log::warn!(target: "config", "{}; using {:?}", e, fallback.reentrancy),
            }
        }
        if let Some(name) = self.dispatch.worker_name.as_deref().filter(|n| !n.is_empty()) {
            config = config.worker_name(name);
        }
        config
    }

    pub fn database_name(&self) -> &str {
        self.library.database.as_deref().unwrap_or("library.sqlite")
    }

    /// Full path of the library database, if a data directory is known.
    pub fn database_path(&self) -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("trackdb").join(self.database_name()))
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trackdb").join("config.toml"))
}

fn merge_dispatch(base: &mut DispatchSection, user: DispatchSection) {
    if user.queue_capacity.is_some() {
        base.queue_capacity = user.queue_capacity;
    }
    if user.shutdown_policy.is_some() {
        base.shutdown_policy = user.shutdown_policy;
    }
    if user.reentrancy.is_some() {
        base.reentrancy = user.reentrancy;
    }
    if user.worker_name.is_some() {
        base.worker_name = user.worker_name;
    }
}

fn merge_library(base: &mut LibrarySection, user: LibrarySection) {
    if user.database.is_some() {
        base.database = user.database;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackdb_dispatch::MAX_QUEUE_CAPACITY;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::from_embedded();
        let dispatch = config.dispatch();
        assert_eq!(dispatch.queue_capacity, 32);
        assert_eq!(dispatch.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(dispatch.reentrancy, ReentrancyPolicy::Warn);
        assert_eq!(dispatch.worker_name, "library-db");
        assert_eq!(config.database_name(), "library.sqlite");
    }

    #[test]
    fn test_user_overrides_single_fields() {
        let mut config = Config::from_embedded();
        config.merge_str(
            "[dispatch]\nshutdown_policy = \"discard\"\n[library]\ndatabase = \"other.db\"\n",
            "test",
        );
        let dispatch = config.dispatch();
        assert_eq!(dispatch.shutdown_policy, ShutdownPolicy::Discard);
        assert_eq!(dispatch.queue_capacity, 32);
        assert_eq!(dispatch.reentrancy, ReentrancyPolicy::Warn);
        assert_eq!(config.database_name(), "other.db");
    }

    #[test]
    fn test_capacity_is_clamped() {
        let mut config = Config::from_embedded();
        config.merge_str("[dispatch]\nqueue_capacity = 100000\n", "test");
        assert_eq!(config.dispatch().queue_capacity, MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let mut config = Config::from_embedded();
        config.merge_str("[dispatch\nqueue_capacity = ", "test");
        assert_eq!(config.dispatch().queue_capacity, 32);
    }

    #[test]
    fn test_unknown_policy_falls_back() {
        let mut config = Config::from_embedded();
        config.merge_str("[dispatch]\nreentrancy = \"panic\"\n", "test");
        assert_eq!(config.dispatch().reentrancy, ReentrancyPolicy::Warn);
    }
}
