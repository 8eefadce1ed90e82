pub mod face;
pub mod reminder;
pub mod token;
pub mod user;
