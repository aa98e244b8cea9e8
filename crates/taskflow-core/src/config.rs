use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::{
  DEFAULT_TIMEZONE,
  parse_timezone
};

const CONFIG_ENV_VAR: &str =
  "TASKFLOW_CONFIG";
const CONFIG_DIR_NAME: &str = "taskflow";
const CONFIG_FILE_NAME: &str =
  "config.toml";
const SESSION_FILE_NAME: &str =
  "sessions.json";

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Deserialize,
  PartialEq,
  Eq
)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
  #[default]
  Memory,
  File
}

impl SessionBackend {
  fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "memory" => Ok(Self::Memory),
      | "file" => Ok(Self::File),
      | other => {
        Err(anyhow!(
          "unknown session backend: \
           {other}"
        ))
      }
    }
  }
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default)]
pub struct SessionSettings {
  pub backend: SessionBackend,
  pub path:    Option<PathBuf>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub bot_token:            Option<String>,
  pub api_base_url:         String,
  pub api_prefix:           String,
  pub request_timeout_secs: u64,
  pub log_level:            String,
  pub timezone:             String,
  pub page_size:            usize,
  pub group_page_size:      usize,
  pub category_page_size:   usize,
  pub session:              SessionSettings,

  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      bot_token:            None,
      api_base_url:
        "http://localhost:8000"
          .to_string(),
      api_prefix:           "/api/v1"
        .to_string(),
      request_timeout_secs: 15,
      log_level:            "info"
        .to_string(),
      timezone:
        DEFAULT_TIMEZONE.to_string(),
      page_size:            10,
      group_page_size:      8,
      category_page_size:   8,
      session:
        SessionSettings::default(),
      loaded_files:         vec![]
    }
  }
}

impl Settings {
  /// File (if any), then `TASKFLOW_*` environment variables.
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut settings =
      match resolve_config_path(
        config_override
      )? {
        | Some(path) => {
          info!(config = %path.display(), "loading config");
          Self::from_file(&path)?
        }
        | None => {
          warn!(
            "no config file found; \
             using defaults"
          );
          Self::default()
        }
      };

    settings.apply_env(|key| {
      std::env::var(key).ok()
    })?;
    Ok(settings)
  }

  pub fn from_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let mut settings: Settings =
      toml::from_str(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    settings.loaded_files.push(path);
    Ok(settings)
  }

  pub fn apply_env<F>(
    &mut self,
    lookup: F
  ) -> anyhow::Result<()>
  where
    F: Fn(&str) -> Option<String>
  {
    let pairs = [
      ("TASKFLOW_BOT_TOKEN", "bot_token"),
      (
        "TASKFLOW_API_BASE_URL",
        "api_base_url"
      ),
      ("TASKFLOW_LOG_LEVEL", "log_level"),
      ("TASKFLOW_TIMEZONE", "timezone"),
      (
        "TASKFLOW_SESSION_PATH",
        "session.path"
      )
    ];
    for (var, key) in pairs {
      if let Some(value) = lookup(var)
        .filter(|v| !v.trim().is_empty())
      {
        debug!(
          env = var,
          key, "applying env override"
        );
        self.set(key, &value)?;
        if key == "session.path" {
          self.session.backend =
            SessionBackend::File;
        }
      }
    }
    Ok(())
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      debug!(key = %key, "applying override");
      self.set(&key, &value)?;
    }
    Ok(())
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    let number = |v: &str| {
      v.parse::<usize>().with_context(
        || {
          format!(
            "{key} expects a number, \
             got {v}"
          )
        }
      )
    };
    match key.trim() {
      | "bot_token" => {
        self.bot_token =
          Some(value.to_string());
      }
      | "api_base_url" => {
        self.api_base_url =
          value.to_string();
      }
      | "api_prefix" => {
        self.api_prefix =
          value.to_string();
      }
      | "request_timeout_secs" => {
        self.request_timeout_secs =
          number(value)? as u64;
      }
      | "log_level" => {
        self.log_level =
          value.to_string();
      }
      | "timezone" => {
        self.timezone = value.to_string();
      }
      | "page_size" => {
        self.page_size = number(value)?;
      }
      | "group_page_size" => {
        self.group_page_size =
          number(value)?;
      }
      | "category_page_size" => {
        self.category_page_size =
          number(value)?;
      }
      | "session.backend" => {
        self.session.backend =
          SessionBackend::parse(value)?;
      }
      | "session.path" => {
        self.session.path = Some(
          expand_tilde(Path::new(value))
        );
      }
      | other => {
        return Err(anyhow!(
          "unknown setting: {other}"
        ));
      }
    }
    Ok(())
  }

  pub fn bot_token(
    &self
  ) -> anyhow::Result<&str> {
    self
      .bot_token
      .as_deref()
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| {
        anyhow!(
          "bot_token is not set (config \
           file, TASKFLOW_BOT_TOKEN or \
           --set bot_token=...)"
        )
      })
  }

  /// Falls back to UTC when the configured id does not parse.
  pub fn timezone(&self) -> Tz {
    parse_timezone(
      &self.timezone,
      "settings"
    )
    .unwrap_or(Tz::UTC)
  }

  pub fn request_timeout(
    &self
  ) -> Duration {
    Duration::from_secs(
      self.request_timeout_secs.max(1)
    )
  }

  pub fn session_path(
    &self
  ) -> anyhow::Result<PathBuf> {
    if let Some(path) =
      &self.session.path
    {
      return Ok(path.clone());
    }
    let base = dirs::data_dir()
      .ok_or_else(|| {
        anyhow!(
          "cannot determine data \
           directory"
        )
      })?;
    Ok(
      base
        .join(CONFIG_DIR_NAME)
        .join(SESSION_FILE_NAME)
    )
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(env_path) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if env_path == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      env_path
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    return Ok(None);
  };
  let candidate = config_dir
    .join(CONFIG_DIR_NAME)
    .join(CONFIG_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::io::Write;

  use super::{
    SessionBackend,
    Settings
  };

  #[test]
  fn defaults_match_documented_values() {
    let s = Settings::default();
    assert_eq!(
      s.api_base_url,
      "http://localhost:8000"
    );
    assert_eq!(s.api_prefix, "/api/v1");
    assert_eq!(s.page_size, 10);
    assert_eq!(s.group_page_size, 8);
    assert_eq!(
      s.request_timeout().as_secs(),
      15
    );
    assert!(s.bot_token().is_err());
  }

  #[test]
  fn file_then_env_then_overrides() {
    let mut file =
      tempfile::NamedTempFile::new()
        .expect("temp file");
    writeln!(
      file,
      "bot_token = \"from-file\"\n\
       page_size = 5\n\
       timezone = \"Europe/Moscow\"\n\
       [session]\n\
       backend = \"memory\""
    )
    .expect("write");

    let mut s =
      Settings::from_file(file.path())
        .expect("parse");
    assert_eq!(s.page_size, 5);
    assert_eq!(
      s.timezone().name(),
      "Europe/Moscow"
    );

    let env: HashMap<&str, &str> =
      HashMap::from([
        ("TASKFLOW_BOT_TOKEN", "from-env"),
        (
          "TASKFLOW_SESSION_PATH",
          "/tmp/taskflow/s.json"
        )
      ]);
    s.apply_env(|k| {
      env.get(k).map(|v| v.to_string())
    })
    .expect("env");
    assert_eq!(
      s.bot_token().expect("token"),
      "from-env"
    );
    assert_eq!(
      s.session.backend,
      SessionBackend::File
    );

    s.apply_overrides(vec![(
      "group_page_size".to_string(),
      "3".to_string()
    )])
    .expect("overrides");
    assert_eq!(s.group_page_size, 3);
  }

  #[test]
  fn rejects_unknown_keys_and_bad_numbers() {
    let mut s = Settings::default();
    assert!(s.set("colour", "on").is_err());
    assert!(
      s.set("page_size", "ten").is_err()
    );
    assert!(
      s.set("session.backend", "redis")
        .is_err()
    );
  }

  #[test]
  fn bad_timezone_falls_back_to_utc() {
    let mut s = Settings::default();
    s.timezone = "Mars/Olympus".to_string();
    assert_eq!(s.timezone(), chrono_tz::Tz::UTC);
  }
}
