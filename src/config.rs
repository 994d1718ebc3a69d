use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidVar { var: &'static str, value: String },
    #[error("bus width of {0} bytes is not supported, expected 4 or 8")]
    BusWidth(usize),
    #[error("slave region of {region} bytes is not a non-zero multiple of the {width}-byte bus width")]
    Region { region: u64, width: usize },
    #[error("could not declare {0} in the simulation")]
    Declare(String),
}

/// Settings shared by every test of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TbConfig {
    pub clock_period_ns: u64,
    pub reset_ns: u64,
    /// Simulation precision as a power of ten, -12 is one picosecond.
    pub precision: i8,
    pub seed: u64,
    pub max_sim_time_ns: u64,
    pub junit_path: Option<PathBuf>,
}

impl Default for TbConfig {
    fn default() -> Self {
        TbConfig {
            clock_period_ns: 2,
            reset_ns: 200,
            precision: -12,
            seed: 0x5eed,
            max_sim_time_ns: 1_000_000,
            junit_path: None,
        }
    }
}

impl TbConfig {
    /// Defaults overridden by `AXIL_TB_SEED`, `AXIL_TB_MAX_TIME_NS` and `AXIL_TB_JUNIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = TbConfig::default();
        if let Some(seed) = parse_var(&lookup, "AXIL_TB_SEED")? {
            config.seed = seed;
        }
        if let Some(max) = parse_var(&lookup, "AXIL_TB_MAX_TIME_NS")? {
            config.max_sim_time_ns = max;
        }
        if let Some(path) = lookup("AXIL_TB_JUNIT") {
            config.junit_path = Some(PathBuf::from(path));
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_bench() {
        let c = TbConfig::default();
        assert_eq!(c.clock_period_ns, 2);
        assert_eq!(c.reset_ns, 200);
        assert!(c.junit_path.is_none());
    }

    #[test]
    fn lookup_overrides() {
        let c = TbConfig::from_lookup(|var| match var {
            "AXIL_TB_SEED" => Some("42".to_string()),
            "AXIL_TB_JUNIT" => Some("out/results.xml".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(c.seed, 42);
        assert_eq!(c.junit_path, Some(PathBuf::from("out/results.xml")));
        assert_eq!(c.max_sim_time_ns, TbConfig::default().max_sim_time_ns);
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = TbConfig::from_lookup(|var| match var {
            "AXIL_TB_MAX_TIME_NS" => Some("soon".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidVar {
                var: "AXIL_TB_MAX_TIME_NS",
                value: "soon".to_string()
            }
        );
    }
}
