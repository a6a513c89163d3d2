use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;
use std::path::Path;

pub const ECG: &str = "ECG";
pub const UNKNOWN: &str = "UNKNOWN";

/// Channel name → signal type lookup.
#[derive(Debug, Clone)]
pub struct ChannelTypes {
    types: HashMap<String, String>,
}

impl Default for ChannelTypes {
    /// Signal names used by the bedside monitor recordings.
    fn default() -> Self {
        let builtin = [
            ("I", ECG),
            ("II", ECG),
            ("III", ECG),
            ("V", ECG),
            ("aVR", ECG),
            ("aVL", ECG),
            ("aVF", ECG),
            ("MCL", ECG),
            ("PLETH", "PPG"),
            ("ABP", "ABP"),
            ("RESP", "RESP"),
        ];
        Self::from_pairs(builtin)
    }
}

impl ChannelTypes {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            types: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a two-column `name<TAB>type` table; blank and `#` lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());
        let mut types = HashMap::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("parsing channel type row {}", idx + 1))?;
            let fields: Vec<&str> = record
                .iter()
                .flat_map(str::split_whitespace)
                .filter(|f| !f.is_empty())
                .collect();
            match fields.as_slice() {
                [] => continue,
                [name, kind, ..] => {
                    types.insert(name.to_string(), kind.to_string());
                }
                [name] => anyhow::bail!("channel {} has no type on row {}", name, idx + 1),
            }
        }
        if types.is_empty() {
            anyhow::bail!("no channel types found");
        }
        Ok(Self { types })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing channel types {}", path.display()))
    }

    pub fn channel_type(&self, channel: &str) -> &str {
        self.types.get(channel).map(String::as_str).unwrap_or(UNKNOWN)
    }

    pub fn is_ecg(&self, channel: &str) -> bool {
        self.channel_type(channel) == ECG
    }
}
