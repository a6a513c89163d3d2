use crate::{
    distance::dtw::{AlignError, Alignment},
    signal::{AnalysisWindow, RecordMeta, Recording},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Respiration is never compared.
pub const RESPIRATION: &str = "RESP";

/// Result of comparing one channel of two recordings.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Distance(f64),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Respiration,
    MissingChannel,
    Align(AlignError),
}

/// Per-channel alignment cost between two recordings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDistances(BTreeMap<String, f64>);

impl ChannelDistances {
    pub fn insert(&mut self, channel: impl Into<String>, distance: f64) {
        self.0.insert(channel.into(), distance);
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.0.get(channel).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.values().copied()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ChannelDistances {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// How two recordings are compared channel by channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelComparison {
    pub window: AnalysisWindow,
    pub max_channels: usize,
    pub alignment: Alignment,
}

impl ChannelComparison {
    /// Channels present in both recordings, in the query's channel order,
    /// truncated to `max_channels`.
    pub fn common_channels<'a>(&self, query: &'a RecordMeta, candidate: &RecordMeta) -> Vec<&'a str> {
        let mut common: Vec<&str> = Vec::new();
        for name in &query.channels {
            if candidate.channel_index(name).is_some() && !common.contains(&name.as_str()) {
                common.push(name);
            }
        }
        common.truncate(self.max_channels);
        common
    }

    pub fn compare_channel(&self, query: &Recording, candidate: &Recording, channel: &str) -> ChannelOutcome {
        if channel == RESPIRATION {
            return ChannelOutcome::Skipped(SkipReason::Respiration);
        }
        let (Some(q), Some(c)) = (query.channel(channel), candidate.channel(channel)) else {
            return ChannelOutcome::Skipped(SkipReason::MissingChannel);
        };
        let q = self.window.slice(q, query.meta.fs);
        let c = self.window.slice(c, candidate.meta.fs);
        match self.alignment.distance(q, c) {
            Ok(distance) => ChannelOutcome::Distance(distance),
            Err(err) => ChannelOutcome::Skipped(SkipReason::Align(err)),
        }
    }

    /// Distance for every comparable channel; skipped channels are left out.
    pub fn distances(&self, query: &Recording, candidate: &Recording) -> ChannelDistances {
        let mut out = ChannelDistances::default();
        for channel in self.common_channels(&query.meta, &candidate.meta) {
            match self.compare_channel(query, candidate, channel) {
                ChannelOutcome::Distance(d) => out.insert(channel, d),
                ChannelOutcome::Skipped(reason) => debug!(
                    "{} vs {}: skipping {} ({:?})",
                    query.name(),
                    candidate.name(),
                    channel,
                    reason
                ),
            }
        }
        out
    }
}
