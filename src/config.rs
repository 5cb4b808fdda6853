//! Environment-driven settings for both jobs. A `.env` file in the working
//! directory is honored; real environment variables take precedence.

use chrono::NaiveDate;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

use crate::error::ConfigError;
use crate::fetch::Retry;

pub const DEFAULT_INDEX_URL: &str = "https://www.epicentro.iss.it/coronavirus/aggiornamenti";
pub const DEFAULT_GIST_API: &str = "https://api.github.com/";

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub index_url: Url,
    /// Bulletins published before this date are ignored.
    pub since: Option<NaiveDate>,
    pub retry: Retry,
}

#[derive(Debug, Clone)]
pub struct BadgeConfig {
    pub data_dir: PathBuf,
    pub label: String,
    pub color: String,
    pub filename: String,
    pub dry_run: bool,
    pub gist: Option<GistTarget>,
}

/// Where the badge document is published. Required unless dry-running.
#[derive(Debug, Clone)]
pub struct GistTarget {
    pub api_base: Url,
    pub gist_id: String,
    pub token: String,
}

pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T, F>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn url<F>(get: &F, var: &'static str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = get(var).unwrap_or_else(|| default.to_string());
    Url::parse(&value).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn flag<F>(get: &F, var: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: v,
                reason: "expected a boolean".into(),
            }),
        },
    }
}

impl UpdateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let since = match get("ICCAS_SINCE") {
            None => None,
            Some(value) => Some(NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(
                |e| ConfigError::Invalid {
                    var: "ICCAS_SINCE",
                    reason: e.to_string(),
                    value,
                },
            )?),
        };
        let defaults = Retry::default();
        let backoff_ms = parsed(
            &get,
            "ICCAS_RETRY_BACKOFF_MS",
            defaults.initial_backoff.as_millis() as u64,
        )?;

        Ok(Self {
            data_dir: parsed(&get, "ICCAS_DATA_DIR", PathBuf::from("data"))?,
            reports_dir: parsed(&get, "ICCAS_REPORTS_DIR", PathBuf::from("reports"))?,
            index_url: url(&get, "ICCAS_INDEX_URL", DEFAULT_INDEX_URL)?,
            since,
            retry: Retry {
                max_retries: parsed(&get, "ICCAS_MAX_RETRIES", defaults.max_retries)?,
                initial_backoff: Duration::from_millis(backoff_ms),
            },
        })
    }
}

impl BadgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = flag(&get, "BADGE_DRY_RUN")?;
        let gist = match (get("BADGE_GIST_ID"), get("BADGE_TOKEN")) {
            (Some(gist_id), Some(token)) => Some(GistTarget {
                api_base: url(&get, "BADGE_API_URL", DEFAULT_GIST_API)?,
                gist_id,
                token,
            }),
            _ if dry_run => None,
            (None, _) => return Err(ConfigError::Missing("BADGE_GIST_ID")),
            (Some(_), None) => return Err(ConfigError::Missing("BADGE_TOKEN")),
        };

        Ok(Self {
            data_dir: parsed(&get, "ICCAS_DATA_DIR", PathBuf::from("data"))?,
            label: get("BADGE_LABEL").unwrap_or_else(|| "last update".into()),
            color: get("BADGE_COLOR").unwrap_or_else(|| "blue".into()),
            filename: get("BADGE_FILENAME").unwrap_or_else(|| "iccas-last-update.json".into()),
            dry_run,
            gist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn update_defaults() {
        let cfg = UpdateConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.reports_dir, PathBuf::from("reports"));
        assert_eq!(cfg.index_url.as_str(), DEFAULT_INDEX_URL);
        assert_eq!(cfg.since, None);
        assert_eq!(cfg.retry.max_retries, 3);
    }

    #[test]
    fn update_overrides() {
        let cfg = UpdateConfig::from_lookup(lookup(&[
            ("ICCAS_DATA_DIR", "/srv/iccas/data"),
            ("ICCAS_SINCE", "2020-10-01"),
            ("ICCAS_MAX_RETRIES", "0"),
            ("ICCAS_RETRY_BACKOFF_MS", "10"),
        ]))
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/iccas/data"));
        assert_eq!(cfg.since, NaiveDate::from_ymd_opt(2020, 10, 1));
        assert_eq!(cfg.retry.max_retries, 0);
        assert_eq!(cfg.retry.initial_backoff, Duration::from_millis(10));
    }

    #[test]
    fn invalid_values_are_reported_with_their_variable() {
        let err = UpdateConfig::from_lookup(lookup(&[("ICCAS_MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ICCAS_MAX_RETRIES", .. }));

        let err = UpdateConfig::from_lookup(lookup(&[("ICCAS_SINCE", "01/10/2020")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ICCAS_SINCE", .. }));
    }

    #[test]
    fn badge_requires_gist_unless_dry_run() {
        let err = BadgeConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BADGE_GIST_ID"));

        let err = BadgeConfig::from_lookup(lookup(&[("BADGE_GIST_ID", "abc")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BADGE_TOKEN"));

        let cfg = BadgeConfig::from_lookup(lookup(&[("BADGE_DRY_RUN", "true")])).unwrap();
        assert!(cfg.dry_run);
        assert!(cfg.gist.is_none());
        assert_eq!(cfg.label, "last update");
    }

    #[test]
    fn badge_with_gist() {
        let cfg = BadgeConfig::from_lookup(lookup(&[
            ("BADGE_GIST_ID", "abc123"),
            ("BADGE_TOKEN", "secret"),
            ("BADGE_LABEL", "data updated"),
        ]))
        .unwrap();
        let gist = cfg.gist.unwrap();
        assert_eq!(gist.gist_id, "abc123");
        assert_eq!(gist.api_base.as_str(), DEFAULT_GIST_API);
        assert_eq!(cfg.label, "data updated");
    }
}
