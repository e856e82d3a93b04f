pub mod data_api;
pub mod market_status;
pub mod results;
pub mod store;
pub mod types;
