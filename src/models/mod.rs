pub mod signalement;

pub use signalement::*;
