//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod blog;
pub mod user;

pub use blog::{BlogRepository, SqlxBlogRepository};
pub use user::{DuplicateEmail, SqlxUserRepository, UserRepository};
