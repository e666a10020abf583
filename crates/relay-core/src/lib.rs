pub mod accumulator;
pub mod action_block;
pub mod actions;
pub mod cleaner;
pub mod config;
pub mod detector;
pub mod reducer;
pub mod state;
pub mod transcript;

pub use accumulator::*;
pub use action_block::*;
pub use actions::*;
pub use cleaner::*;
pub use detector::*;
pub use reducer::*;
pub use state::*;
pub use transcript::*;
