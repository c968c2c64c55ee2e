use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::approval::Role;
use crate::datetime::parse_weekday_name;

pub const DEFAULT_LIST_LIMIT: u32 = 20;

const DEFAULTS: &[(&str, &str)] = &[
  ("data.location", "~/.rota"),
  ("backend", "file"),
  ("default.command", "list"),
  ("color", "on"),
  ("calendar.week_start", "sunday"),
  ("list.limit", "20"),
  ("user.role", "manager"),
  ("api.timeout_secs", "30")
];

/// Which schedule backend commands talk to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum BackendKind {
  File,
  Http
}

impl FromStr for BackendKind {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      | "file" | "local" => Ok(Self::File),
      | "http" | "api" => Ok(Self::Http),
      | other => Err(anyhow!(
        "unknown backend '{other}' (expected file or http)"
      ))
    }
  }
}

/// Flat `key=value` settings from the rc file plus command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let map = DEFAULTS
      .iter()
      .map(|(k, v)| {
        (k.to_string(), v.to_string())
      })
      .collect();
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rotarc_override
  ))]
  pub fn load(
    rotarc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rotarc_path(
      rotarc_override
    )? {
      | Some(path) => {
        info!(rotarc = %path.display(), "loading rotarc");
        cfg.load_file(&path)?;
      }
      | None => {
        warn!("no rotarc found; using defaults");
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      if is_secret(&key) {
        debug!(key = %key, "applying override");
      } else {
        debug!(key = %key, value = %v, "applying override");
      }
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .get(key)
      .map(|v| {
        v.parse::<u64>().with_context(
          || {
            format!(
              "{key} must be a whole number, got '{v}'"
            )
          }
        )
      })
      .transpose()
  }

  pub fn backend_kind(
    &self
  ) -> anyhow::Result<BackendKind> {
    self
      .get("backend")
      .as_deref()
      .unwrap_or("file")
      .parse()
  }

  pub fn role(
    &self
  ) -> anyhow::Result<Role> {
    let raw = self
      .get("user.role")
      .unwrap_or_else(|| {
        "manager".to_string()
      });
    raw.parse::<Role>().map_err(|_| {
      anyhow!(
        "unknown user.role '{raw}' (expected manager, director or hr)"
      )
    })
  }

  pub fn week_start(
    &self
  ) -> anyhow::Result<Weekday> {
    let raw = self
      .get("calendar.week_start")
      .unwrap_or_else(|| {
        "sunday".to_string()
      });
    parse_weekday_name(&raw)
      .ok_or_else(|| {
        anyhow!(
          "invalid calendar.week_start '{raw}'"
        )
      })
  }

  pub fn list_limit(
    &self
  ) -> anyhow::Result<u32> {
    let limit = self
      .get_u64("list.limit")?
      .unwrap_or(u64::from(
        DEFAULT_LIST_LIMIT
      ));
    Ok(
      u32::try_from(limit)
        .unwrap_or(u32::MAX)
        .max(1)
    )
  }

  /// Zero disables the timeout.
  pub fn api_timeout(
    &self
  ) -> anyhow::Result<Option<Duration>> {
    Ok(
      self
        .get_u64("api.timeout_secs")?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
    )
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
          file = %path.display(),
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(value)) => {
      expand_tilde(Path::new(&value))
    }
    | (None, None) => {
      home_dir()?.join(".rota")
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rotarc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(rotarc_unless_null(path));
  }

  if let Ok(env_path) =
    std::env::var("ROTARC")
  {
    return Ok(rotarc_unless_null(
      Path::new(&env_path)
    ));
  }

  let candidate =
    home_dir()?.join(".rotarc");
  Ok(
    candidate
      .exists()
      .then_some(candidate)
  )
}

fn rotarc_unless_null(
  path: &Path
) -> Option<PathBuf> {
  (path != Path::new("/dev/null"))
    .then(|| path.to_path_buf())
}

fn home_dir()
-> anyhow::Result<PathBuf> {
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

pub fn is_secret(key: &str) -> bool {
  key.starts_with("auth.")
    || key == "api.token"
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_cover_core_keys() {
    let cfg = Config::default();
    assert_eq!(
      cfg.backend_kind().expect("backend"),
      BackendKind::File
    );
    assert_eq!(
      cfg.week_start().expect("week start"),
      Weekday::Sun
    );
    assert_eq!(
      cfg.list_limit().expect("limit"),
      20
    );
    assert_eq!(
      cfg.role().expect("role"),
      Role::Manager
    );
    assert_eq!(
      cfg.api_timeout().expect("timeout"),
      Some(Duration::from_secs(30))
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "calendar.week_start = monday\n"
    )
    .expect("write extra");
    let rc = dir.path().join("rotarc");
    fs::write(
      &rc,
      "# local settings\nbackend=http  # remote\napi.url=http://hris.local\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(&rc)).expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.backend_kind().expect("backend"),
      BackendKind::Http
    );
    assert_eq!(
      cfg.week_start().expect("week start"),
      Weekday::Mon
    );

    cfg.apply_overrides(vec![
      ("rc.user.role".to_string(), "hr".to_string()),
      ("api.timeout_secs".to_string(), "0".to_string())
    ]);
    assert_eq!(
      cfg.role().expect("role"),
      Role::Hr
    );
    assert_eq!(
      cfg.api_timeout().expect("timeout"),
      None
    );
  }

  #[test]
  fn dev_null_disables_rc_file() {
    let cfg =
      Config::load(Some(Path::new("/dev/null")))
        .expect("load");
    assert!(cfg.loaded_files.is_empty());
  }

  #[test]
  fn rejects_malformed_values() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let rc = dir.path().join("rotarc");
    fs::write(&rc, "not a setting\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());

    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      ("list.limit".to_string(), "many".to_string()),
      ("backend".to_string(), "ftp".to_string())
    ]);
    assert!(cfg.list_limit().is_err());
    assert!(cfg.backend_kind().is_err());
  }
}
