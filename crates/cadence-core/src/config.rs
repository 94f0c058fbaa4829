use std::collections::BTreeMap;
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
use tracing::{
  debug,
  info,
  trace
};

pub const RC_ENV_VAR: &str =
  "CADENCERC";

const DEFAULTS: [(&str, &str); 3] = [
  ("color", "on"),
  ("countdown.interval", "1"),
  ("data.location", "~/.cadence")
];

/// Flat `key = value` settings, rc
/// file over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
  values: BTreeMap<String, String>,
  pub source: Option<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      values: DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      source: None
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();

    let Some(path) =
      rc_path(rc_override)?
    else {
      debug!(
        "no rc file; using defaults"
      );
      return Ok(cfg);
    };

    let path = expand_tilde(&path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    cfg.merge_rc(&text, &path)?;
    info!(rc = %path.display(), keys = cfg.values.len(), "loaded rc file");
    cfg.source = Some(path);

    Ok(cfg)
  }

  /// Later lines win. `#` starts a
  /// comment anywhere on a line.
  fn merge_rc(
    &mut self,
    text: &str,
    origin: &Path
  ) -> anyhow::Result<()> {
    for (idx, raw) in
      text.lines().enumerate()
    {
      let line = raw
        .split('#')
        .next()
        .unwrap_or_default()
        .trim();
      if line.is_empty() {
        continue;
      }

      let Some((key, value)) =
        line.split_once('=')
      else {
        return Err(anyhow!(
          "{}:{}: expected key = \
           value, got {raw:?}",
          origin.display(),
          idx + 1
        ));
      };
      trace!(key = key.trim(), value = value.trim(), "rc entry");
      self.values.insert(
        key.trim().to_string(),
        value.trim().to_string()
      );
    }
    Ok(())
  }

  /// Applies `key=value` overrides; a
  /// leading `rc.` is dropped.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key)
        .to_string();
      debug!(key = %key, value = %value, "rc override");
      self.values.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .values
      .get(key)
      .map(String::as_str)
  }

  /// Entries in key order.
  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&str, &str)>
  {
    self.values.iter().map(|(k, v)| {
      (k.as_str(), v.as_str())
    })
  }

  /// Period between countdown
  /// evaluations.
  pub fn countdown_period(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("countdown.interval")
      .unwrap_or("1");
    let secs: f64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "invalid \
             countdown.interval: {raw}"
          )
        }
      )?;
    if !secs.is_finite() || secs <= 0.0
    {
      return Err(anyhow!(
        "countdown.interval must be \
         positive, got {raw}"
      ));
    }
    Ok(Duration::from_secs_f64(secs))
  }
}

/// `--data` wins over
/// `data.location`; the directory is
/// created when missing.
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
    | (None, Some(location)) => {
      expand_tilde(Path::new(location))
    }
    | (None, None) => home()?
      .join(".cadence")
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

/// `--rcfile`, then `$CADENCERC`
/// (`/dev/null` disables), then
/// `~/.cadencerc` when present.
fn rc_path(
  rc_override: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = rc_override {
    return Ok(Some(path.to_path_buf()));
  }

  match std::env::var(RC_ENV_VAR) {
    | Ok(value) if value == "/dev/null" => {
      Ok(None)
    }
    | Ok(value) => {
      Ok(Some(PathBuf::from(value)))
    }
    | Err(_) => {
      let candidate =
        home()?.join(".cadencerc");
      Ok(candidate
        .exists()
        .then_some(candidate))
    }
  }
}

fn home() -> anyhow::Result<PathBuf> {
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn rc_file_overrides_defaults() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("cadencerc");
    fs::write(
      &rc,
      "# reminders\ncolor = off \
       # plain output\n\ntimezone = \
       UTC\ncountdown.interval = 5\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(rc.as_path()))
        .expect("load rc");
    assert_eq!(
      cfg.source.as_deref(),
      Some(rc.as_path())
    );
    assert_eq!(cfg.get("color"), Some("off"));
    assert_eq!(
      cfg.get("timezone"),
      Some("UTC")
    );
    assert_eq!(
      cfg.get("data.location"),
      Some("~/.cadence")
    );
    assert_eq!(
      cfg
        .countdown_period()
        .expect("period"),
      Duration::from_secs(5)
    );

    cfg.apply_overrides([(
      "rc.countdown.interval"
        .to_string(),
      "0.5".to_string()
    )]);
    assert_eq!(
      cfg
        .countdown_period()
        .expect("period"),
      Duration::from_millis(500)
    );

    let keys: Vec<&str> =
      cfg.iter().map(|(k, _)| k).collect();
    assert_eq!(
      keys,
      vec![
        "color",
        "countdown.interval",
        "data.location",
        "timezone"
      ]
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let mut cfg = Config::default();
    let err = cfg
      .merge_rc(
        "color = on\ninclude extra.rc\n",
        Path::new("cadencerc")
      )
      .expect_err("bad line");
    assert!(
      err.to_string().contains("cadencerc:2")
    );
  }

  #[test]
  fn rejects_non_positive_period() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "countdown.interval".to_string(),
      "0".to_string()
    )]);
    assert!(
      cfg.countdown_period().is_err()
    );
  }
}
