pub mod config;
pub mod plan;

pub use config::{Config, DispatchMode, RuntimeArgs};
pub use plan::{PartitionPlan, RowRange};
