mod search;
mod system;

pub use search::{SearchSystem, SEARCH_TOOL};
pub use system::System;
