use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Duration;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::{
  WallClock,
  parse_timezone
};
use crate::poller::{
  DEFAULT_INTERVAL_SECS,
  DEFAULT_WINDOW_SECS,
  PollerSettings,
  ReminderWindow,
  clamp_interval
};
use crate::session::SessionSettings;
use crate::task::View;

const RC_ENV_VAR: &str = "CHECKLISTRC";
const RC_FILE_NAME: &str =
  ".checklistrc";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading checklistrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no checklistrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (k, v) in [
      ("data.location", "~/.checklist"),
      ("timezone", "UTC"),
      ("poll.interval", "30"),
      ("reminder.window", "trailing"),
      ("reminder.window.seconds", "300"),
      ("form.require_reminders", "off"),
      ("notifications", "on"),
      (
        "notification.icon",
        "checklist.png"
      ),
      ("confirm", "on"),
      ("color", "on"),
      ("default.view", "All")
    ] {
      map.insert(
        k.to_string(),
        v.to_string()
      );
    }
    Config {
      map,
      loaded_files: vec![]
    }
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
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().map_err(
          |_| {
            anyhow!(
              "config {key} must be a \
               whole number, got: {v}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn default_view(
    &self
  ) -> anyhow::Result<View> {
    let raw = self
      .get("default.view")
      .unwrap_or_else(|| {
        "All".to_string()
      });
    raw.parse::<View>().context(
      "invalid default.view"
    )
  }

  pub fn wall_clock(
    &self
  ) -> anyhow::Result<WallClock> {
    let raw = self
      .get("timezone")
      .unwrap_or_else(|| {
        "UTC".to_string()
      });
    Ok(WallClock::new(parse_timezone(
      &raw
    )?))
  }

  pub fn session_settings(
    &self
  ) -> anyhow::Result<SessionSettings> {
    Ok(SessionSettings {
      require_reminders: self
        .get_bool(
          "form.require_reminders"
        )
        .unwrap_or(false),
      clock:             self
        .wall_clock()?
    })
  }

  pub fn poller_settings(
    &self
  ) -> anyhow::Result<PollerSettings> {
    let secs = self
      .get_u64("poll.interval")?
      .unwrap_or(DEFAULT_INTERVAL_SECS);
    let interval = clamp_interval(secs);
    if interval.as_secs() != secs {
      warn!(
        requested = secs,
        used = interval.as_secs(),
        "poll.interval out of range; \
         clamped"
      );
    }

    let window = match self
      .get("reminder.window")
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "trailing" => {
        let requested = self
          .get_u64(
            "reminder.window.seconds"
          )?
          .unwrap_or(
            DEFAULT_WINDOW_SECS.unsigned_abs()
          );
        let width =
          requested.max(interval.as_secs());
        if width != requested {
          warn!(
            requested,
            used = width,
            "reminder.window.seconds \
             shorter than poll.interval; \
             widened"
          );
        }
        let delta = i64::try_from(width)
          .ok()
          .and_then(Duration::try_seconds)
          .ok_or_else(|| {
            anyhow!(
              "reminder.window.seconds \
               out of range: {width}"
            )
          })?;
        ReminderWindow::Trailing(delta)
      }
      | "catchup" => {
        ReminderWindow::Catchup
      }
      | other => {
        return Err(anyhow!(
          "invalid reminder.window: \
           {other} (expected trailing \
           or catchup)"
        ));
      }
    };

    Ok(PollerSettings {
      interval,
      window,
      icon: self
        .get("notification.icon")
        .unwrap_or_else(|| {
          "checklist.png".to_string()
        })
    })
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
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

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
      trace!(key = %key, value = %value, "loaded config key");
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
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
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
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".checklist"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
