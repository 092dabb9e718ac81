pub mod breakdown;
pub mod equipment;
pub mod planning_type;
pub mod status;
pub mod stoppage;
pub mod sync;
pub mod sync_log;
