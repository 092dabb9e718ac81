pub mod memory_store;
pub mod postgrest;
pub mod progilift;
pub mod record_store;
pub mod run_log;
