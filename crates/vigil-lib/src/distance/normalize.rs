use crate::{distance::channels::ChannelDistances, io::sigtypes::ChannelTypes};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unsupported normalization: {0}")]
    Unsupported(String),
    #[error("no ECG channel among {0:?}")]
    NoEcgChannels(Vec<String>),
}

/// Reduction applied to a channel distance map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Normalization {
    #[default]
    EcgAverage,
    EcgMin,
    EcgMax,
    Average,
    Min,
    Max,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::EcgAverage => "ecg_average",
            Normalization::EcgMin => "ecg_min",
            Normalization::EcgMax => "ecg_max",
            Normalization::Average => "average",
            Normalization::Min => "min",
            Normalization::Max => "max",
        }
    }

    fn ecg_only(&self) -> bool {
        matches!(
            self,
            Normalization::EcgAverage | Normalization::EcgMin | Normalization::EcgMax
        )
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Normalization {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecg_average" => Ok(Normalization::EcgAverage),
            "ecg_min" => Ok(Normalization::EcgMin),
            "ecg_max" => Ok(Normalization::EcgMax),
            "average" => Ok(Normalization::Average),
            "min" => Ok(Normalization::Min),
            "max" => Ok(Normalization::Max),
            other => Err(NormalizeError::Unsupported(other.to_string())),
        }
    }
}

impl TryFrom<String> for Normalization {
    type Error = NormalizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Normalization> for String {
    fn from(value: Normalization) -> Self {
        value.as_str().to_string()
    }
}

/// Collapse per-channel distances into one number.
///
/// An empty map is infinitely far away and a single channel is returned as is,
/// whatever the mode. The `ecg_*` modes fail when no remaining channel is ECG.
pub fn normalize(
    distances: &ChannelDistances,
    mode: Normalization,
    types: &ChannelTypes,
) -> Result<f64, NormalizeError> {
    if distances.is_empty() {
        return Ok(f64::INFINITY);
    }
    if distances.len() == 1 {
        return Ok(distances.values().next().unwrap_or(f64::INFINITY));
    }

    let selected: Vec<f64> = if mode.ecg_only() {
        distances
            .iter()
            .filter(|(channel, _)| types.is_ecg(channel))
            .map(|(_, d)| d)
            .collect()
    } else {
        distances.values().collect()
    };
    if selected.is_empty() {
        return Err(NormalizeError::NoEcgChannels(
            distances.iter().map(|(c, _)| c.to_string()).collect(),
        ));
    }

    let reduced = match mode {
        Normalization::EcgAverage | Normalization::Average => {
            selected.iter().sum::<f64>() / selected.len() as f64
        }
        Normalization::EcgMin | Normalization::Min => {
            selected.iter().copied().fold(f64::INFINITY, f64::min)
        }
        Normalization::EcgMax | Normalization::Max => {
            selected.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }
    };
    Ok(reduced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn map(pairs: &[(&str, f64)]) -> ChannelDistances {
        pairs.iter().map(|(c, d)| (c.to_string(), *d)).collect()
    }

    const MODES: [Normalization; 6] = [
        Normalization::EcgAverage,
        Normalization::EcgMin,
        Normalization::EcgMax,
        Normalization::Average,
        Normalization::Min,
        Normalization::Max,
    ];

    #[test]
    fn empty_map_is_infinitely_far() {
        let types = ChannelTypes::default();
        for mode in MODES {
            assert_eq!(
                normalize(&ChannelDistances::default(), mode, &types).unwrap(),
                f64::INFINITY
            );
        }
    }

    #[test]
    fn single_channel_wins_regardless_of_mode() {
        let types = ChannelTypes::default();
        let dists = map(&[("PLETH", 4.5)]);
        for mode in MODES {
            assert_relative_eq!(normalize(&dists, mode, &types).unwrap(), 4.5);
        }
    }

    #[test]
    fn ecg_modes_only_see_ecg_channels() {
        let types = ChannelTypes::default();
        let dists = map(&[("II", 2.0), ("V", 6.0), ("ABP", 100.0)]);
        assert_relative_eq!(normalize(&dists, Normalization::EcgAverage, &types).unwrap(), 4.0);
        assert_relative_eq!(normalize(&dists, Normalization::EcgMin, &types).unwrap(), 2.0);
        assert_relative_eq!(normalize(&dists, Normalization::EcgMax, &types).unwrap(), 6.0);
        assert_relative_eq!(normalize(&dists, Normalization::Average, &types).unwrap(), 36.0);
        assert_relative_eq!(normalize(&dists, Normalization::Min, &types).unwrap(), 2.0);
        assert_relative_eq!(normalize(&dists, Normalization::Max, &types).unwrap(), 100.0);
    }

    #[test]
    fn every_mode_is_finite_for_ecg_maps() {
        let types = ChannelTypes::default();
        let dists = map(&[("I", 0.0), ("II", 3.0), ("III", 1.5)]);
        for mode in MODES {
            assert!(normalize(&dists, mode, &types).unwrap().is_finite());
        }
    }

    #[test]
    fn ecg_mode_without_ecg_channels_fails() {
        let types = ChannelTypes::default();
        let dists = map(&[("ABP", 1.0), ("PLETH", 2.0)]);
        assert!(matches!(
            normalize(&dists, Normalization::EcgAverage, &types),
            Err(NormalizeError::NoEcgChannels(_))
        ));
        assert_relative_eq!(normalize(&dists, Normalization::Max, &types).unwrap(), 2.0);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert_eq!(
            "median".parse::<Normalization>(),
            Err(NormalizeError::Unsupported("median".into()))
        );
        assert_eq!("ecg_min".parse::<Normalization>(), Ok(Normalization::EcgMin));
        assert_eq!(Normalization::default().to_string(), "ecg_average");
    }
}
