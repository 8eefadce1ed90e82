// Profile CRUD: health profile fields, avatar storage, account deletion.

pub mod avatar;
pub mod handlers;
pub mod repo;
pub mod validation;
