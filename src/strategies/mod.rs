pub mod aggregator;
pub mod consensus;
pub mod filters;
pub mod qualify;
pub mod stats;
pub mod types;
