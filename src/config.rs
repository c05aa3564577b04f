//! Dataset manifest: which files hold which tables.
//!
//! ```yaml
//! category_monthly:
//!   - processed/category_monthly_clean.csv
//! category_yearly:
//!   - processed/category_yearly_clean.csv
//! manufacturers:
//!   - processed/manufacturer_2w.csv
//!   - processed/manufacturer_3w.csv
//!   - processed/manufacturer_4w.csv
//! delimiter: ","
//! encoding: utf-8
//! top_n: 10
//! ```
//!
//! Relative paths resolve against the manifest's directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    error::EngineError,
    io_utils,
    query::{DEFAULT_TOP_N, Dataset, LoadReport},
    schema::RawTable,
};

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    #[serde(default)]
    pub category_monthly: Vec<PathBuf>,
    #[serde(default)]
    pub category_yearly: Vec<PathBuf>,
    #[serde(default)]
    pub manufacturers: Vec<PathBuf>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            category_monthly: Vec::new(),
            category_yearly: Vec::new(),
            manufacturers: Vec::new(),
            delimiter: None,
            encoding: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl DatasetConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading dataset manifest {path:?}"))?;
        let mut config = Self::from_yaml_str(&raw)
            .with_context(|| format!("Parsing dataset manifest {path:?}"))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for list in [
            &mut self.category_monthly,
            &mut self.category_yearly,
            &mut self.manufacturers,
        ] {
            for path in list.iter_mut() {
                if path.is_relative() && !io_utils::is_dash(path) {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// Checks that every required table has at least one source.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.category_monthly.is_empty() {
            return Err(EngineError::configuration(
                "no category monthly table configured",
            ));
        }
        if self.manufacturers.is_empty() {
            return Err(EngineError::configuration(
                "no manufacturer table configured",
            ));
        }
        Ok(())
    }

    pub fn delimiter(&self) -> Result<Option<u8>> {
        self.delimiter
            .as_deref()
            .map(|value| parse_delimiter(value).map_err(anyhow::Error::msg))
            .transpose()
    }

    fn read_tables(&self, paths: &[PathBuf]) -> Result<Vec<RawTable>> {
        let delimiter = self.delimiter()?;
        let encoding = io_utils::resolve_encoding(self.encoding.as_deref())?;
        paths
            .iter()
            .map(|path| {
                if !io_utils::is_dash(path) && !path.exists() {
                    return Err(anyhow::Error::from(EngineError::configuration(format!(
                        "input table {} does not exist",
                        path.display()
                    ))));
                }
                io_utils::read_raw_table(path, delimiter, encoding)
                    .with_context(|| format!("Loading table {path:?}"))
            })
            .collect()
    }

    /// Reads and normalizes every configured table.
    pub fn load_dataset(&self) -> Result<(Dataset, LoadReport)> {
        self.validate()?;
        let monthly = self.read_tables(&self.category_monthly)?;
        let yearly = self.read_tables(&self.category_yearly)?;
        let makers = self.read_tables(&self.manufacturers)?;
        info!(
            "Read {} monthly, {} yearly and {} manufacturer file(s)",
            monthly.len(),
            yearly.len(),
            makers.len()
        );
        Ok(Dataset::from_tables(&monthly, &yearly, &makers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_defaults_top_n_and_optional_tables() {
        let config = DatasetConfig::from_yaml_str(
            "category_monthly: [monthly.csv]\nmanufacturers: [m2w.csv, m4w.csv]\n",
        )
        .expect("parse");
        assert_eq!(config.top_n, DEFAULT_TOP_N);
        assert!(config.category_yearly.is_empty());
        assert_eq!(config.manufacturers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(DatasetConfig::from_yaml_str("category_montly: [a.csv]\n").is_err());
    }

    #[test]
    fn missing_required_tables_fail_validation() {
        let config = DatasetConfig {
            category_monthly: vec![PathBuf::from("monthly.csv")],
            ..DatasetConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn relative_paths_follow_manifest_directory() {
        let mut config = DatasetConfig {
            category_monthly: vec![PathBuf::from("monthly.csv")],
            manufacturers: vec![PathBuf::from("/abs/m.csv"), PathBuf::from("-")],
            ..DatasetConfig::default()
        };
        config.resolve_relative_to(Path::new("/data"));
        assert_eq!(config.category_monthly[0], PathBuf::from("/data/monthly.csv"));
        assert_eq!(config.manufacturers[0], PathBuf::from("/abs/m.csv"));
        assert_eq!(config.manufacturers[1], PathBuf::from("-"));
    }

    #[test]
    fn delimiter_names_are_understood() {
        let config = DatasetConfig {
            delimiter: Some("tab".into()),
            ..DatasetConfig::default()
        };
        assert_eq!(config.delimiter().unwrap(), Some(b'\t'));
    }
}
