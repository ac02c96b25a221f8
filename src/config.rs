use crate::kitchen::ResourceKind;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`BrewConfig::step_latency`], e.g. `50ms`.
pub const STEP_LATENCY_ENV: &str = "TEAFLOW_STEP_LATENCY";

/// Pacing and fault settings for one run.
///
/// Every simulated delay derives from `step_latency` (D); the remaining
/// fields are multiples of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewConfig {
    /// Duration of one simulated step
    #[serde(with = "humantime_serde")]
    pub step_latency: Duration,

    /// Length of the synchronous kettle fill, in steps
    pub fill_units: u32,

    /// CPU chunks per fill step; cancellation is observed between chunks
    pub chunks_per_unit: u32,

    /// Delay steps while boiling
    pub boil_steps: u32,

    /// Steps before the synchronous fill is cancelled in the first scenario
    pub sync_cancel_after: u32,

    /// Steps before the concurrent gather is cancelled in the second scenario
    pub gather_cancel_after: u32,

    /// Steps after the assembly group starts before the cup is dropped
    pub assembly_drop_after: u32,

    /// Durable resources whose acquisition fails
    pub unavailable: Vec<ResourceKind>,
}

impl Default for BrewConfig {
    fn default() -> Self {
        Self {
            step_latency: Duration::from_millis(200),
            fill_units: 3,
            chunks_per_unit: 10,
            boil_steps: 5,
            sync_cancel_after: 2,
            gather_cancel_after: 3,
            assembly_drop_after: 3,
            unavailable: Vec::new(),
        }
    }
}

impl BrewConfig {
    /// Load from a TOML file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: BrewConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_step_latency(mut self, step_latency: Duration) -> Self {
        self.step_latency = step_latency;
        self
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(STEP_LATENCY_ENV) {
            self.step_latency = humantime_serde::re::humantime::parse_duration(&value)
                .with_context(|| format!("Invalid {STEP_LATENCY_ENV} value '{value}'"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_latency.is_zero() {
            return Err(anyhow!("step_latency must be greater than zero"));
        }
        if self.fill_units == 0 || self.chunks_per_unit == 0 {
            return Err(anyhow!("fill_units and chunks_per_unit must be at least 1"));
        }
        if self.boil_steps == 0 {
            return Err(anyhow!("boil_steps must be at least 1"));
        }
        if self.fill_units.checked_mul(self.chunks_per_unit).is_none() {
            return Err(anyhow!("fill_units * chunks_per_unit is too large"));
        }
        for (name, count) in [
            ("fill_units", self.fill_units),
            ("boil_steps", self.boil_steps),
            ("sync_cancel_after", self.sync_cancel_after),
            ("gather_cancel_after", self.gather_cancel_after),
            ("assembly_drop_after", self.assembly_drop_after),
        ] {
            if self.step_latency.checked_mul(count).is_none() {
                return Err(anyhow!(
                    "{name} = {count} steps of {:?} overflows the maximum duration",
                    self.step_latency
                ));
            }
        }
        Ok(())
    }

    /// `count` steps of simulated latency, saturating at [`Duration::MAX`].
    pub fn steps(&self, count: u32) -> Duration {
        self.step_latency.checked_mul(count).unwrap_or(Duration::MAX)
    }

    pub fn fill_chunk(&self) -> Duration {
        self.step_latency / self.chunks_per_unit
    }

    pub fn fill_chunk_count(&self) -> u32 {
        self.fill_units.saturating_mul(self.chunks_per_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BrewConfig::default();
        assert_eq!(config.step_latency, Duration::from_millis(200));
        assert_eq!(config.fill_chunk(), Duration::from_millis(20));
        assert_eq!(config.fill_chunk_count(), 30);
        assert_eq!(config.steps(3), Duration::from_millis(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "step_latency = \"50ms\"").unwrap();
        writeln!(file, "boil_steps = 2").unwrap();
        writeln!(file, "unavailable = [\"milk\"]").unwrap();

        let config = BrewConfig::load(file.path()).unwrap();
        assert_eq!(config.step_latency, Duration::from_millis(50));
        assert_eq!(config.boil_steps, 2);
        assert_eq!(config.fill_units, 3);
        assert_eq!(config.unavailable, vec![ResourceKind::Milk]);
    }

    #[test]
    fn test_load_rejects_overflowing_delays() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "step_latency = \"1000years\"").unwrap();
        writeln!(file, "assembly_drop_after = 4000000000").unwrap();

        let error = BrewConfig::load(file.path()).unwrap_err();
        assert!(format!("{error:#}").contains("assembly_drop_after"));
    }

    #[test]
    fn test_steps_saturate_instead_of_panicking() {
        let config = BrewConfig {
            step_latency: Duration::from_secs(u64::MAX / 2),
            ..BrewConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.steps(3), Duration::MAX);
        assert_eq!(config.steps(1), Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn test_load_rejects_zero_latency() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "step_latency = \"0s\"").unwrap();

        let err = BrewConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("step_latency"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BrewConfig::load(Path::new("/nonexistent/teaflow.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
