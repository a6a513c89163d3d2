use crate::signal::RecordMeta;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Alarm condition a recording was captured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arrhythmia {
    #[serde(rename = "a")]
    Asystole,
    #[serde(rename = "b")]
    ExtremeBradycardia,
    #[serde(rename = "t")]
    ExtremeTachycardia,
    #[serde(rename = "v")]
    VentricularTachycardia,
    #[serde(rename = "f")]
    VentricularFlutterFibrillation,
}

impl Arrhythmia {
    pub const ALL: [Arrhythmia; 5] = [
        Arrhythmia::Asystole,
        Arrhythmia::ExtremeBradycardia,
        Arrhythmia::ExtremeTachycardia,
        Arrhythmia::VentricularTachycardia,
        Arrhythmia::VentricularFlutterFibrillation,
    ];

    pub fn tag(&self) -> char {
        match self {
            Arrhythmia::Asystole => 'a',
            Arrhythmia::ExtremeBradycardia => 'b',
            Arrhythmia::ExtremeTachycardia => 't',
            Arrhythmia::VentricularTachycardia => 'v',
            Arrhythmia::VentricularFlutterFibrillation => 'f',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.tag() == tag.to_ascii_lowercase())
    }
}

impl fmt::Display for Arrhythmia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Arrhythmia {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_ascii_lowercase();
        let mut chars = trimmed.chars();
        if let (Some(tag), None) = (chars.next(), chars.next()) {
            return Self::from_tag(tag).ok_or_else(|| anyhow!("unknown arrhythmia tag: {}", s));
        }
        match trimmed.replace(['-', '_', ' '], "").as_str() {
            "asystole" => Ok(Arrhythmia::Asystole),
            "bradycardia" | "extremebradycardia" => Ok(Arrhythmia::ExtremeBradycardia),
            "tachycardia" | "extremetachycardia" => Ok(Arrhythmia::ExtremeTachycardia),
            "ventricular" | "ventriculartachycardia" => Ok(Arrhythmia::VentricularTachycardia),
            "fibrillation" | "ventricularflutterfibrillation" | "ventricularflutter" => {
                Ok(Arrhythmia::VentricularFlutterFibrillation)
            }
            _ => Err(anyhow!("unknown arrhythmia: {}", s)),
        }
    }
}

/// Arrhythmia type encoded by the first letter of the record name.
pub fn arrhythmia_type(meta: &RecordMeta) -> Result<Arrhythmia> {
    meta.name
        .chars()
        .next()
        .and_then(Arrhythmia::from_tag)
        .ok_or_else(|| anyhow!("record {} has no arrhythmia prefix", meta.name))
}

/// Ground truth from the `True alarm` / `False alarm` header comment.
pub fn is_true_alarm(meta: &RecordMeta) -> Result<bool> {
    for comment in &meta.comments {
        let lowered = comment.trim().to_ascii_lowercase();
        if lowered == "true alarm" {
            return Ok(true);
        }
        if lowered == "false alarm" {
            return Ok(false);
        }
    }
    Err(anyhow!("record {} carries no alarm label", meta.name))
}
