use std::{
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use serde::{
  Deserialize,
  Serialize,
};
use the_lib::options::CompletionOptions;
use thiserror::Error;
use toml::Value;

pub const CONFIG_DIR_ENV: &str = "THE_SHELL_CONFIG_DIR";

pub const LOCAL_CONFIG_FILE: &str = ".the-shell.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ShellConfig {
  pub prompt:         String,
  /// Width used to lay out candidate tables. Detected from `COLUMNS` when
  /// unset.
  pub terminal_width: Option<usize>,
  pub completion:     CompletionOptions,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      prompt:         "> ".to_string(),
      terminal_width: None,
      completion:     CompletionOptions::default(),
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
  #[error("bad config: {0}")]
  BadConfig(#[from] toml::de::Error),
  #[error(transparent)]
  Error(#[from] io::Error),
}

impl ShellConfig {
  /// Layers the `local` document over the `global` one. Either may be
  /// missing; a document that does not parse is an error.
  pub fn load(
    global: Result<String, ConfigLoadError>,
    local: Result<String, ConfigLoadError>,
  ) -> Result<ShellConfig, ConfigLoadError> {
    let merged = match (parse_document(global)?, parse_document(local)?) {
      (None, None) => return Ok(ShellConfig::default()),
      (Some(value), None) | (None, Some(value)) => value,
      (Some(global), Some(local)) => merge_toml_values(global, local, 3),
    };
    Ok(merged.try_into()?)
  }

  pub fn load_files(global: Option<&Path>, local: &Path) -> Result<ShellConfig, ConfigLoadError> {
    let global = match global {
      Some(path) => fs::read_to_string(path).map_err(ConfigLoadError::Error),
      None => Err(io::Error::from(io::ErrorKind::NotFound).into()),
    };
    let local = fs::read_to_string(local).map_err(ConfigLoadError::Error);
    Self::load(global, local)
  }

  /// Loads `config.toml` from the user config directory, or `config_file`
  /// when given, overlaid with `.the-shell.toml` from the working directory.
  pub fn load_user(config_file: Option<&Path>) -> Result<ShellConfig, ConfigLoadError> {
    let global = config_file
      .map(Path::to_path_buf)
      .or_else(|| config_dir().map(|dir| dir.join("config.toml")));
    Self::load_files(global.as_deref(), Path::new(LOCAL_CONFIG_FILE))
  }
}

fn parse_document(source: Result<String, ConfigLoadError>) -> Result<Option<Value>, ConfigLoadError> {
  match source {
    Ok(text) => Ok(Some(toml::from_str(&text)?)),
    Err(ConfigLoadError::Error(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(err) => Err(err),
  }
}

pub fn config_dir() -> Option<PathBuf> {
  if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
    return Some(PathBuf::from(dir));
  }
  match choose_base_strategy() {
    Ok(strategy) => Some(strategy.config_dir().join("the-shell")),
    Err(err) => {
      tracing::warn!(%err, "no user config directory, skipping the global config");
      None
    },
  }
}

/// Merges `right` onto `left`.
///
/// Tables present on both sides are merged key by key until `merge_depth`
/// levels deep; below that, and for every other kind of value, `right` wins.
pub fn merge_toml_values(left: Value, right: Value, merge_depth: usize) -> Value {
  match (left, right) {
    (Value::Table(mut left_map), Value::Table(right_map)) if merge_depth > 0 => {
      for (name, rvalue) in right_map {
        let merged = match left_map.remove(&name) {
          Some(lvalue) => merge_toml_values(lvalue, rvalue, merge_depth - 1),
          None => rvalue,
        };
        left_map.insert(name, merged);
      }
      Value::Table(left_map)
    },
    (_, value) => value,
  }
}
