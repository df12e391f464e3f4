use crate::domain::models::WeekStart;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::{DEFAULT_CALENDAR_API_BASE, DEFAULT_PAGE_SIZE};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub default_week_start: WeekStart,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            timezone: default_timezone(),
            default_week_start: WeekStart::Monday,
            api_base_url: default_api_base_url(),
            page_size: default_page_size(),
        }
    }
}

impl AppConfig {
    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{}': {error}", self.timezone))
        })
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_CALENDAR_API_BASE.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: AppConfig = serde_json::from_str(&raw)?;
    if parsed.schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            parsed.schema,
            path.display()
        )));
    }
    if parsed.page_size == 0 {
        return Err(InfraError::InvalidConfig(format!(
            "pageSize must be > 0 in {}",
            path.display()
        )));
    }
    parsed.time_zone()?;
    Ok(parsed)
}
