use crate::{
    classifier::NearestNeighbor,
    distance::{Alignment, ChannelComparison, Normalization},
    io::sigtypes::ChannelTypes,
    signal::AnalysisWindow,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for a classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Alarm onset in seconds from the start of each recording.
    pub alarm_time_s: f64,
    /// Length of the analysis window ending at the alarm onset.
    pub window_s: f64,
    /// Upper bound on channels compared per recording pair.
    pub max_channels: usize,
    pub normalization: Normalization,
    pub alignment: Alignment,
    /// Leave out test samples whose type has no training entry instead of failing.
    pub skip_unknown_types: bool,
    /// Worker threads; `None` uses the rayon default.
    pub threads: Option<usize>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            alarm_time_s: 300.0,
            window_s: 20.0,
            max_channels: 1,
            normalization: Normalization::default(),
            alignment: Alignment::default(),
            skip_unknown_types: false,
            threads: None,
        }
    }
}

impl EvaluationConfig {
    pub fn window(&self) -> AnalysisWindow {
        AnalysisWindow {
            alarm_time_s: self.alarm_time_s,
            duration_s: self.window_s,
        }
    }

    pub fn classifier(&self, channel_types: ChannelTypes) -> NearestNeighbor {
        NearestNeighbor {
            comparison: ChannelComparison {
                window: self.window(),
                max_channels: self.max_channels,
                alignment: self.alignment,
            },
            normalization: self.normalization,
            channel_types,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let window_ok = self.window_s > 0.0 && self.alarm_time_s >= self.window_s;
        if !window_ok {
            anyhow::bail!(
                "analysis window of {}s must be positive and end at or after it starts (alarm at {}s)",
                self.window_s,
                self.alarm_time_s
            );
        }
        if self.max_channels == 0 {
            anyhow::bail!("max_channels must be at least 1");
        }
        if self.threads == Some(0) {
            anyhow::bail!("threads must be at least 1");
        }
        Ok(())
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_challenge_setup() {
        let cfg = EvaluationConfig::default();
        assert_eq!(cfg.window().alarm_time_s, 300.0);
        assert_eq!(cfg.window_s, 20.0);
        assert_eq!(cfg.max_channels, 1);
        assert_eq!(cfg.normalization, Normalization::EcgAverage);
        assert_eq!(cfg.alignment, Alignment::Fast { radius: 1 });
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EvaluationConfig::parse(
            r#"
            max_channels = 3
            normalization = "min"
            alignment = { method = "exact" }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.max_channels, 3);
        assert_eq!(cfg.normalization, Normalization::Min);
        assert_eq!(cfg.alignment, Alignment::Exact);
        assert_eq!(cfg.alarm_time_s, 300.0);
    }

    #[test]
    fn fast_alignment_takes_a_radius() {
        let cfg = EvaluationConfig::parse("alignment = { method = \"fast\", radius = 4 }").unwrap();
        assert_eq!(cfg.alignment, Alignment::Fast { radius: 4 });
    }

    #[test]
    fn unsupported_normalization_is_a_config_error() {
        let err = EvaluationConfig::parse("normalization = \"median\"").unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported normalization"));
    }

    #[test]
    fn shipped_demo_files_load() {
        let demos = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("demos");
        let cfg = EvaluationConfig::load(&demos.join("vigil.toml")).unwrap();
        assert_eq!(cfg, EvaluationConfig::default());
        let types = ChannelTypes::load(&demos.join("sigtypes.tsv")).unwrap();
        assert!(types.is_ecg("II"));
        assert!(!types.is_ecg("RESP"));
    }

    #[test]
    fn rejects_degenerate_windows() {
        assert!(EvaluationConfig::parse("window_s = 0.0").is_err());
        assert!(EvaluationConfig::parse("alarm_time_s = 10.0").is_err());
        assert!(EvaluationConfig::parse("max_channels = 0").is_err());
        assert!(EvaluationConfig::parse("threads = 0").is_err());
    }
}
