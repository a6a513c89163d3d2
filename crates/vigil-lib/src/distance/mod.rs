pub mod channels;
pub mod dtw;
pub mod normalize;

pub use channels::{ChannelComparison, ChannelDistances, ChannelOutcome, SkipReason};
pub use dtw::{AlignError, Alignment};
pub use normalize::{normalize, NormalizeError, Normalization};
