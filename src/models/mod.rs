//! Data models
//!
//! Database entities (Blog, User) and the listing/pagination types shared by
//! repositories, services and the API layer.

mod blog;
mod user;

pub use blog::{Blog, BlogFilter, Genre, ListParams, NewBlog, PagedResult, RelatedLink, Since};
pub use user::{User, UserRole};
