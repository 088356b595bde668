pub mod gateway;
pub mod memory;
pub mod models;
pub mod pg;
