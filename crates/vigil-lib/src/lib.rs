pub mod classifier;
pub mod config;
pub mod distance;
pub mod evaluation;
pub mod io;
pub mod labels;
pub mod pipeline;
pub mod signal;

pub use classifier::*;
pub use config::*;
pub use evaluation::*;
pub use signal::*;
