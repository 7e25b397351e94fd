pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;

pub use jwt::JwtService;
pub use middleware::{auth_middleware, AuthFailureLimiter, AuthState};
pub use models::{AuthContext, JwtClaims, TokenType};
