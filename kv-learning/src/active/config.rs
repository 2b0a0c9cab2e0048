use tracing::debug;

use crate::{acex::AcexAnalyzer, ConfigError};

/// Environment variable that selects the counterexample analyzer by name.
pub const ANALYZER_VARIABLE: &str = "KV_ANALYZER";
/// Environment variable that toggles repeated evaluation of counterexamples.
pub const REPEATED_EVALUATION_VARIABLE: &str = "KV_REPEATED_EVALUATION";

/// Settings shared by the learners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvConfig {
    /// If set, a counterexample is processed again after a refinement until it no longer
    /// refutes the hypothesis.
    pub repeated_counterexample_evaluation: bool,
    /// The strategy for locating the breakpoint in a counterexample.
    pub analyzer: AcexAnalyzer,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            repeated_counterexample_evaluation: true,
            analyzer: AcexAnalyzer::default(),
        }
    }
}

impl KvConfig {
    /// Sets whether counterexamples are evaluated repeatedly.
    pub fn with_repeated_evaluation(mut self, repeated: bool) -> Self {
        self.repeated_counterexample_evaluation = repeated;
        self
    }

    /// Sets the counterexample analyzer.
    pub fn with_analyzer(mut self, analyzer: AcexAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Starts from the default configuration and applies the overrides given in the
    /// environment, see [`ANALYZER_VARIABLE`] and [`REPEATED_EVALUATION_VARIABLE`]. Unset
    /// variables keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup(ANALYZER_VARIABLE) {
            config.analyzer = name.parse()?;
        }
        if let Some(value) = lookup(REPEATED_EVALUATION_VARIABLE) {
            config.repeated_counterexample_evaluation =
                parse_flag(REPEATED_EVALUATION_VARIABLE, &value)?;
        }
        debug!("using configuration {config:?}");
        Ok(config)
    }
}

fn parse_flag(variable: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            variable: variable.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |variable: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == variable)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn config_defaults() {
        let config = KvConfig::default();
        assert!(config.repeated_counterexample_evaluation);
        assert_eq!(config.analyzer, AcexAnalyzer::BinarySearch);
        assert_eq!(KvConfig::from_lookup(lookup(&[])), Ok(config));
    }

    #[test]
    fn config_from_environment() {
        let config = KvConfig::from_lookup(lookup(&[
            (ANALYZER_VARIABLE, "linear-bwd"),
            (REPEATED_EVALUATION_VARIABLE, "0"),
        ]))
        .unwrap();
        assert_eq!(
            config,
            KvConfig::default()
                .with_analyzer(AcexAnalyzer::LinearBackward)
                .with_repeated_evaluation(false)
        );

        assert_eq!(
            KvConfig::from_lookup(lookup(&[(REPEATED_EVALUATION_VARIABLE, "maybe")])),
            Err(ConfigError::InvalidFlag {
                variable: REPEATED_EVALUATION_VARIABLE.to_string(),
                value: "maybe".to_string()
            })
        );
        assert_eq!(
            KvConfig::from_lookup(lookup(&[(ANALYZER_VARIABLE, "random")])),
            Err(ConfigError::UnknownAnalyzer("random".to_string()))
        );
    }
}
