use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    sinks::ReferencePaths,
    sources::{SheetRef, SheetsAuth},
    transform::MethaneUnit,
};

pub const CONFIG_ENV_VAR: &str = "LEAK_ETL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "leak-etl.toml";

fn default_timeout_secs() -> u64 {
    30
}

fn default_range() -> String {
    "Form Responses 1!A1:H".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SheetsApi,
    CsvFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub sheet_id: Option<String>,
    #[serde(default = "default_range")]
    pub range: String,
    /// Name of the env var holding an OAuth bearer token.
    pub access_token_env: Option<String>,
    /// Name of the env var holding an API key.
    pub api_key_env: Option<String>,
    pub csv_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub raw_archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub methane_unit: MethaneUnit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotosConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapsConfig {
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub textfile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub source: SourceConfig,
    pub reference: ReferencePaths,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub photos: PhotosConfig,
    pub maps: MapsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load from `explicit`, else the path in `LEAK_ETL_CONFIG`, else
    /// `leak-etl.toml` in the working directory.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::env;

        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg = Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sheet_ref(&self) -> anyhow::Result<SheetRef> {
        let sheet_id = self
            .sheet_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("source.sheet_id is required for kind = \"sheets_api\""))?;
        Ok(SheetRef {
            sheet_id,
            range: self.range.clone(),
        })
    }

    /// Resolve credentials from the env vars the config names. A bearer token
    /// wins over an API key when both are configured.
    pub fn sheets_auth(&self) -> anyhow::Result<SheetsAuth> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("env var {name} is not set"))
        };
        match (&self.access_token_env, &self.api_key_env) {
            (Some(name), _) => Ok(SheetsAuth::BearerToken(read(name)?)),
            (None, Some(name)) => Ok(SheetsAuth::ApiKey(read(name)?)),
            (None, None) => anyhow::bail!("source needs access_token_env or api_key_env"),
        }
    }

    pub fn csv_path(&self) -> anyhow::Result<&Path> {
        self.csv_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("source.csv_path is required for kind = \"csv_file\""))
    }
}

impl PhotosConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [store]
        path = "data/survey.db"

        [source]
        kind = "csv_file"
        csv_path = "data/raw.csv"

        [reference]
        cities = "data/reference/cities.csv"
        utilities = "data/reference/utilities.csv"
        volunteers = "data/reference/volunteers.csv"

        [maps]
        output_dir = "html"
    "#;

    #[test]
    fn optional_sections_take_defaults() {
        let cfg = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.source.kind, SourceKind::CsvFile);
        assert_eq!(cfg.source.range, "Form Responses 1!A1:H");
        assert_eq!(cfg.source.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.transform.methane_unit, MethaneUnit::Ppm);
        assert!(!cfg.photos.enabled);
        assert_eq!(cfg.metrics.textfile_path, None);
        assert_eq!(cfg.source.csv_path().unwrap(), Path::new("data/raw.csv"));
    }

    #[test]
    fn sheets_source_requires_an_id_and_credentials() {
        let cfg = AppConfig::from_toml_str(&MINIMAL.replace(
            "kind = \"csv_file\"",
            "kind = \"sheets_api\"\napi_key_env = \"LEAK_ETL_TEST_SURELY_UNSET_KEY\"",
        ))
        .unwrap();
        assert_eq!(cfg.source.kind, SourceKind::SheetsApi);
        assert!(cfg.source.sheet_ref().is_err());
        assert!(cfg.source.sheets_auth().is_err());
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let bad = MINIMAL.replace("csv_file", "carrier_pigeon");
        assert!(AppConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn lel_unit_parses() {
        let cfg = AppConfig::from_toml_str(&format!("{MINIMAL}\n[transform]\nmethane_unit = \"lel\"\n")).unwrap();
        assert_eq!(cfg.transform.methane_unit, MethaneUnit::Lel);
    }
}
