//! Data models

mod artifact;
mod chat;
mod user;
mod workspace;

pub use artifact::*;
pub use chat::*;
pub use user::*;
pub use workspace::*;
