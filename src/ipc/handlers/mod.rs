pub mod active_learning;
pub mod articulation;
pub mod backup;
pub mod cache;
pub mod config;
pub mod core;
pub mod cotarget;
pub mod lock;
pub mod roster;
pub mod sheets;
