//! Services layer - Business logic
//!
//! Services own the rules of the blog: generation and its freshness gate,
//! listings and lookups over the repositories and cache, and user accounts.

pub mod blog;
pub mod generator;
pub mod genre;
pub mod image;
pub mod llm;
pub mod password;
pub mod scheduler;
pub mod token;
pub mod user;

pub use blog::{BlogService, BlogServiceError, GenerationTicket, LatestBlog, ListQuery};
pub use generator::{BlogGenerator, GenerationError, GenerationOutcome};
pub use image::{ImageSearch, UnsplashClient};
pub use llm::{GeminiClient, TextGenerator};
pub use password::{hash_password, verify_password};
pub use scheduler::spawn_scheduler;
pub use token::{Claims, TokenError, TokenService};
pub use user::{
    AuthSession, LoginInput, Profile, RegisterInput, UserService, UserServiceError,
};
