//! Value types shared by the crawler and the content server.

mod amount;
mod common;

pub use amount::*;
pub use common::*;
