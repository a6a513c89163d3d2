use serde::{Deserialize, Serialize};

/// Header-level description of a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Record name, e.g. `a103l`
    pub name: String,
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Ordered signal names, one per channel
    pub channels: Vec<String>,
    /// Free-text header comments (`#` lines without the marker)
    #[serde(default)]
    pub comments: Vec<String>,
}

impl RecordMeta {
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }
}

/// Multi-channel recording in physical units, one column per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub meta: RecordMeta,
    pub signals: Vec<Vec<f64>>,
}

impl Recording {
    pub fn new(meta: RecordMeta, signals: Vec<Vec<f64>>) -> anyhow::Result<Self> {
        if meta.channels.len() != signals.len() {
            anyhow::bail!(
                "record {} names {} channels but carries {} signals",
                meta.name,
                meta.channels.len(),
                signals.len()
            );
        }
        Ok(Self { meta, signals })
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.meta
            .channel_index(name)
            .and_then(|idx| self.signals.get(idx))
            .map(Vec::as_slice)
    }

    /// Number of samples in the longest channel.
    pub fn len(&self) -> usize {
        self.signals.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.meta.fs
    }
}

/// Fixed interval (seconds) preceding the alarm onset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub alarm_time_s: f64,
    pub duration_s: f64,
}

impl AnalysisWindow {
    /// Sample range `[start, end)` for a channel sampled at `fs`, clamped to `len`.
    pub fn range(&self, fs: f64, len: usize) -> std::ops::Range<usize> {
        let end = (fs * self.alarm_time_s).max(0.0) as usize;
        let start = (fs * (self.alarm_time_s - self.duration_s)).max(0.0) as usize;
        let end = end.min(len);
        start.min(end)..end
    }

    pub fn slice<'a>(&self, data: &'a [f64], fs: f64) -> &'a [f64] {
        &data[self.range(fs, data.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(channels: &[&str]) -> RecordMeta {
        RecordMeta {
            name: "a100s".into(),
            fs: 250.0,
            channels: channels.iter().map(|c| c.to_string()).collect(),
            comments: vec![],
        }
    }

    #[test]
    fn looks_up_channel_by_name() {
        let rec = Recording::new(meta(&["II", "V"]), vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(rec.channel("V"), Some(&[3.0, 4.0][..]));
        assert!(rec.channel("PLETH").is_none());
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn rejects_mismatched_channel_count() {
        assert!(Recording::new(meta(&["II", "V"]), vec![vec![1.0]]).is_err());
    }

    #[test]
    fn window_covers_interval_before_alarm() {
        let window = AnalysisWindow {
            alarm_time_s: 300.0,
            duration_s: 20.0,
        };
        assert_eq!(window.range(250.0, 82_500), 70_000..75_000);
    }

    #[test]
    fn window_clamps_to_short_signals() {
        let window = AnalysisWindow {
            alarm_time_s: 10.0,
            duration_s: 4.0,
        };
        assert_eq!(window.range(1.0, 8), 6..8);
        assert_eq!(window.range(1.0, 3), 3..3);
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(window.slice(&data, 1.0), &[6.0, 7.0]);
    }
}
