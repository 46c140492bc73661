pub mod contract;
pub mod metric;
pub mod snapshot;
pub mod source;
