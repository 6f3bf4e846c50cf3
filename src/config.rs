use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth;
use crate::errors::ConfigError;

const DEFAULT_PASSWORD: &str = "admin123";
const MAX_DAYS_SINCE_RELEASE: i64 = 36_500;
const MAX_HISTOGRAM_BINS: usize = 1_000;

/// Thresholds governing classification and ranking. Built once at startup
/// and passed by reference; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Days a discipline must have been released before it can be judged.
    pub min_days_since_release: i64,
    /// Exclusive completion ceiling for the engagement categories.
    pub max_completion_for_abandonment: f64,
    /// Skip records that already carry an end date.
    pub only_without_end_date: bool,
    /// Completion percentage at which a record counts as done.
    pub min_completion_for_done: f64,
    pub top_n_courses: usize,
    pub top_n_disciplines: usize,
    pub top_n_disciplines_access: usize,
    /// Minimum graded records (or completions) before a discipline is ranked.
    pub min_evaluations_for_grade_rank: usize,
    /// Minimum records before a discipline's completion rate is ranked.
    pub min_enrollments_for_rate: usize,
    /// Abandoned records below this completion count as early abandonment.
    pub initial_abandonment_threshold: f64,
    pub histogram_bins: usize,
    /// Hex SHA-256 digest of the dashboard password.
    pub password_sha256: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_days_since_release: 30,
            max_completion_for_abandonment: 50.0,
            only_without_end_date: true,
            min_completion_for_done: 100.0,
            top_n_courses: 10,
            top_n_disciplines: 20,
            top_n_disciplines_access: 15,
            min_evaluations_for_grade_rank: 5,
            min_enrollments_for_rate: 10,
            initial_abandonment_threshold: 20.0,
            histogram_bins: 20,
            password_sha256: auth::digest_password(DEFAULT_PASSWORD),
        }
    }
}

impl Settings {
    /// Reads settings from a TOML file, falling back to the built-in defaults
    /// when the file does not exist. The result is always validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let settings = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded settings");
                settings
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_days_since_release <= 0 || self.min_days_since_release > MAX_DAYS_SINCE_RELEASE {
            return Err(invalid("min_days_since_release", "must be in 1..=36500"));
        }
        let ceiling = self.max_completion_for_abandonment;
        if ceiling.is_nan() || ceiling <= 0.0 || ceiling > 100.0 {
            return Err(invalid(
                "max_completion_for_abandonment",
                "must be in (0, 100]",
            ));
        }
        if self.min_completion_for_done.is_nan() || self.min_completion_for_done < 0.0 {
            return Err(invalid("min_completion_for_done", "must be >= 0"));
        }
        if !self.initial_abandonment_threshold.is_finite() {
            return Err(invalid("initial_abandonment_threshold", "must be a number"));
        }

        for (name, value) in [
            ("top_n_courses", self.top_n_courses),
            ("top_n_disciplines", self.top_n_disciplines),
            ("top_n_disciplines_access", self.top_n_disciplines_access),
            ("histogram_bins", self.histogram_bins),
        ] {
            if value == 0 {
                return Err(invalid(name, "must be greater than 0"));
            }
        }

        if self.histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(invalid("histogram_bins", "must be at most 1000"));
        }

        if self.password_sha256.len() != 64
            || !self.password_sha256.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(invalid(
                "password_sha256",
                "must be a 64-character hex SHA-256 digest",
            ));
        }

        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}
