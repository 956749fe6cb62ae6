//! Session-wide settings.

use innervation_export::TsvOptions;
use innervation_pipeline::AnalysisConfig;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Settings fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Normalization percentiles and the threshold mode each image
    /// starts with.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Results-file formatting.
    #[serde(default)]
    pub export: TsvOptions,
}

impl SessionConfig {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] for invalid analysis settings.
    pub fn validate(&self) -> Result<(), SessionError> {
        self.analysis.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use innervation_pipeline::ThresholdMode;

    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"export":{"precision":3,"header":false}}"#).unwrap();
        assert_eq!(config.analysis, AnalysisConfig::default());
        assert_eq!(config.export.precision, 3);
    }

    #[test]
    fn json_round_trip() {
        let mut config = SessionConfig::default();
        config.analysis.threshold = ThresholdMode::Manual(90.0);
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_percentiles_rejected() {
        let mut config = SessionConfig::default();
        config.analysis.normalization.low_percentile = 120.0;
        assert!(config.validate().is_err());
    }
}
