use crate::calendar::parse_time;
use crate::parser::natural_language::time_extractor::DEFAULT_EVENT_DURATION_MINUTES;
use crate::scheduling::conflict_resolver::{
    ResolverSettings, DEFAULT_MAX_SUGGESTIONS, DEFAULT_SEARCH_PADDING_MINUTES,
    DEFAULT_SLOT_FIRST_HOUR, DEFAULT_SLOT_LAST_HOUR,
};
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub default_duration_minutes: Option<i64>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self { default_duration_minutes: Some(DEFAULT_EVENT_DURATION_MINUTES) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub search_padding_minutes: i64,
    /// Earliest start of a suggested slot, HH:MM
    pub day_start: String,
    /// Latest end of a suggested slot, HH:MM
    pub day_end: String,
    pub max_suggestions: usize,
    pub slot_first_hour: u32,
    pub slot_last_hour: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            search_padding_minutes: DEFAULT_SEARCH_PADDING_MINUTES,
            day_start: "06:00".to_string(),
            day_end: "23:00".to_string(),
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            slot_first_hour: DEFAULT_SLOT_FIRST_HOUR,
            slot_last_hour: DEFAULT_SLOT_LAST_HOUR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Memory,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory holding `events.json`; defaults to the platform data directory.
    pub state_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    /// Load the config at `config_path`, writing the defaults there first if it is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let default_config = Config::default();
            default_config.save_to(config_path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn default_duration(&self) -> Duration {
        let minutes = self
            .calendar
            .default_duration_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_EVENT_DURATION_MINUTES);
        Duration::minutes(minutes)
    }

    /// Resolver settings, validated.
    pub fn resolver_settings(&self) -> Result<ResolverSettings> {
        let scheduling = &self.scheduling;
        let day_start = parse_time(&scheduling.day_start)
            .with_context(|| format!("Invalid scheduling.day_start '{}'", scheduling.day_start))?;
        let day_end = parse_time(&scheduling.day_end)
            .with_context(|| format!("Invalid scheduling.day_end '{}'", scheduling.day_end))?;
        if day_start >= day_end {
            return Err(anyhow!("scheduling.day_start must be before scheduling.day_end"));
        }
        if scheduling.search_padding_minutes < 0 {
            return Err(anyhow!("scheduling.search_padding_minutes must not be negative"));
        }
        if scheduling.slot_first_hour > scheduling.slot_last_hour || scheduling.slot_last_hour > 23 {
            return Err(anyhow!("scheduling slot hours must satisfy first <= last <= 23"));
        }

        Ok(ResolverSettings {
            search_padding: Duration::minutes(scheduling.search_padding_minutes),
            day_start,
            day_end,
            max_suggestions: scheduling.max_suggestions,
            slot_first_hour: scheduling.slot_first_hour,
            slot_last_hour: scheduling.slot_last_hour,
        })
    }

    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.storage.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "ducktape", "ducktape-scheduler")
        .context("Failed to determine config directory")
}

fn get_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.calendar.default_duration_minutes, Some(60));
        assert_eq!(config.default_duration(), Duration::hours(1));
        assert_eq!(config.storage.backend, StoreBackend::Json);

        let settings = config.resolver_settings().unwrap();
        assert_eq!(settings, ResolverSettings::default());
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let temp_dir = tempdir()?;
        let config_path = temp_dir.path().join("nested").join("config.toml");

        // Missing file is created with defaults
        let created = Config::load_from(&config_path)?;
        assert!(config_path.exists());
        assert_eq!(created.scheduling.max_suggestions, 8);

        let mut config = Config::default();
        config.scheduling.day_start = "07:30".to_string();
        config.storage.backend = StoreBackend::Memory;
        config.save_to(&config_path)?;

        let loaded = Config::load_from(&config_path)?;
        assert_eq!(loaded.storage.backend, StoreBackend::Memory);
        assert_eq!(
            loaded.resolver_settings()?.day_start,
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let config: Config = toml::from_str("[scheduling]\nmax_suggestions = 3\n")?;
        assert_eq!(config.scheduling.max_suggestions, 3);
        assert_eq!(config.scheduling.day_end, "23:00");
        assert_eq!(config.default_duration(), Duration::hours(1));
        Ok(())
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = Config::default();
        config.scheduling.day_start = "23:30".to_string();
        assert!(config.resolver_settings().is_err());

        let mut config = Config::default();
        config.scheduling.day_end = "25:00".to_string();
        assert!(config.resolver_settings().is_err());
    }
}
