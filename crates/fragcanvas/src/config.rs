use std::path::PathBuf;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::types::SurfaceSize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Canvas settings loaded from a TOML file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanvasConfig {
    /// Shader file, relative paths resolved by the caller.
    pub shader: Option<PathBuf>,
    /// Inline shader text.
    pub source: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub autoresize: bool,
    #[serde(default, deserialize_with = "deserialize_size_opt")]
    pub size: Option<SurfaceSize>,
    /// Still image bound as `iChannel0`.
    pub input: Option<PathBuf>,
    pub title: Option<String>,
}

impl CanvasConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CanvasConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shader.is_some() && self.source.is_some() {
            return Err(ConfigError::Invalid(
                "`shader` and `source` are mutually exclusive".into(),
            ));
        }

        if let Some(path) = &self.shader {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("`shader` path may not be empty".into()));
            }
        }

        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ConfigError::Invalid("`title` may not be blank".into()));
            }
        }

        Ok(())
    }
}

/// Parses `WIDTHxHEIGHT` (`x`, `X` or `×` as separator), both non-zero.
pub fn parse_size(spec: &str) -> Result<SurfaceSize, ConfigError> {
    let trimmed = spec.trim();
    let (width, height) = trimmed.split_once(['x', 'X', '×']).ok_or_else(|| {
        ConfigError::Invalid(format!("expected WIDTHxHEIGHT, e.g. 1280x720, got '{trimmed}'"))
    })?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid width in size '{trimmed}'")))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid height in size '{trimmed}'")))?;

    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(
            "surface dimensions must be greater than zero".into(),
        ));
    }

    Ok(SurfaceSize::new(width, height))
}

fn deserialize_size_opt<'de, D>(deserializer: D) -> Result<Option<SurfaceSize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|spec| parse_size(&spec).map_err(de::Error::custom))
        .transpose()
}
