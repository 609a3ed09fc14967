//! Background Tasks Module
//!
//! # Tasks
//! - Maintenance: reaps expired local entries and trims idle Redis
//!   connections at a fixed interval

mod maintenance;

pub use maintenance::spawn_maintenance_task;
