// Medication reminders: CRUD, schedule expansion, dose tracking, background sweep.

pub mod handlers;
pub mod repo;
pub mod schedule;
pub mod sweeper;
pub mod validation;
