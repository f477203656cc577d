use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

pub const DATA_DIR_KEY: &str = "ART_DATA_DIR";
pub const DB_PATH_KEY: &str = "ART_DB_PATH";
pub const STORAGE_ROOT_KEY: &str = "ART_STORAGE_ROOT";
pub const PUBLIC_BASE_URL_KEY: &str = "ART_PUBLIC_BASE_URL";
pub const VERIFY_BASE_URL_KEY: &str = "ART_VERIFY_BASE_URL";
pub const MAX_IMAGE_BYTES_KEY: &str = "ART_MAX_IMAGE_BYTES";
pub const CERT_DELAY_KEY: &str = "ART_CERT_DELAY_MS";
pub const NFC_DELAY_KEY: &str = "ART_NFC_DELAY_MS";
pub const AUTOSAVE_DELAY_KEY: &str = "ART_AUTOSAVE_DELAY_MS";

const KEYS: &[&str] = &[
    DATA_DIR_KEY,
    DB_PATH_KEY,
    STORAGE_ROOT_KEY,
    PUBLIC_BASE_URL_KEY,
    VERIFY_BASE_URL_KEY,
    MAX_IMAGE_BYTES_KEY,
    CERT_DELAY_KEY,
    NFC_DELAY_KEY,
    AUTOSAVE_DELAY_KEY,
];

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub storage_root: PathBuf,
    pub public_base_url: String,
    pub verify_base_url: String,
    pub max_image_bytes: usize,
    pub certificate_delay: Duration,
    pub nfc_scan_delay: Duration,
    pub autosave_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(PathBuf::from(".art-registry"))
    }
}

impl AppConfig {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("registry.db"),
            storage_root: data_dir.join("storage"),
            data_dir,
            public_base_url: "http://localhost:8080/storage".to_string(),
            verify_base_url: "https://verify.art-registry.local".to_string(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            certificate_delay: Duration::from_millis(3000),
            nfc_scan_delay: Duration::from_millis(2000),
            autosave_delay: Duration::from_millis(2000),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Builds the configuration from defaults, then the `.env` file at
    /// `env_path` (if present), then process environment variables.
    pub fn load(env_path: &Path) -> Result<Self> {
        let mut values = HashMap::new();
        if env_path.exists() {
            values.extend(load_from_env(env_path)?);
            info!("Loaded configuration from {}", env_path.display());
        }
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                debug!("Environment override for {}", key);
                values.insert((*key).to_string(), value);
            }
        }
        Self::from_values(&values)
    }

    fn from_values(values: &HashMap<String, String>) -> Result<Self> {
        let mut config = match values.get(DATA_DIR_KEY) {
            Some(dir) => Self::with_data_dir(PathBuf::from(dir)),
            None => Self::default(),
        };

        if let Some(path) = values.get(DB_PATH_KEY) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = values.get(STORAGE_ROOT_KEY) {
            config.storage_root = PathBuf::from(path);
        }
        if let Some(url) = values.get(PUBLIC_BASE_URL_KEY) {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = values.get(VERIFY_BASE_URL_KEY) {
            config.verify_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(bytes) = values.get(MAX_IMAGE_BYTES_KEY) {
            config.max_image_bytes = bytes
                .parse()
                .with_context(|| format!("{MAX_IMAGE_BYTES_KEY} must be a byte count"))?;
        }
        if let Some(ms) = values.get(CERT_DELAY_KEY) {
            config.certificate_delay = parse_millis(CERT_DELAY_KEY, ms)?;
        }
        if let Some(ms) = values.get(NFC_DELAY_KEY) {
            config.nfc_scan_delay = parse_millis(NFC_DELAY_KEY, ms)?;
        }
        if let Some(ms) = values.get(AUTOSAVE_DELAY_KEY) {
            config.autosave_delay = parse_millis(AUTOSAVE_DELAY_KEY, ms)?;
        }
        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .parse()
        .map_err(|_| anyhow!("{key} must be a number of milliseconds, got '{value}'"))?;
    Ok(Duration::from_millis(ms))
}

fn load_from_env(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut values = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if KEYS.contains(&key) {
                values.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    Ok(values)
}

pub fn save_to_env(path: &Path, config: &AppConfig) -> Result<()> {
    let mut file = File::create(path).context("Failed to create .env file")?;
    writeln!(file, "{DATA_DIR_KEY}={}", config.data_dir.display())?;
    writeln!(file, "{DB_PATH_KEY}={}", config.db_path.display())?;
    writeln!(file, "{STORAGE_ROOT_KEY}={}", config.storage_root.display())?;
    writeln!(file, "{PUBLIC_BASE_URL_KEY}={}", config.public_base_url)?;
    writeln!(file, "{VERIFY_BASE_URL_KEY}={}", config.verify_base_url)?;
    writeln!(file, "{MAX_IMAGE_BYTES_KEY}={}", config.max_image_bytes)?;
    writeln!(file, "{CERT_DELAY_KEY}={}", config.certificate_delay.as_millis())?;
    writeln!(file, "{NFC_DELAY_KEY}={}", config.nfc_scan_delay.as_millis())?;
    writeln!(file, "{AUTOSAVE_DELAY_KEY}={}", config.autosave_delay.as_millis())?;
    Ok(())
}
