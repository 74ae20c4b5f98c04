pub mod auth;

pub use auth::{Actor, AuthUser, Claims, JwtKeys, Role};
