// Authentication: password + JWT sessions, Google sign-in, face identification.

pub mod extractor;
pub mod face;
pub mod google;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod tokens;

pub use extractor::AuthUser;
