pub mod auth;

pub use auth::{admin_auth_middleware, operator_auth_middleware, Claims};
