//! API handlers module

pub mod codes;
pub mod dental;
pub mod health;
pub mod patients;
pub mod procedures;
pub mod schedules;
