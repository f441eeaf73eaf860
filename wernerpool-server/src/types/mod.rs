//! Value types shared across the pool core.

mod difficulty;
mod hashrate;

pub use difficulty::Difficulty;
pub use hashrate::{HashRate, HashrateEma};
