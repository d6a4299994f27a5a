pub use crate::error::InvariantError;
pub use crate::map::AdaptiveMap;
pub use crate::metrics::MapMetrics;
