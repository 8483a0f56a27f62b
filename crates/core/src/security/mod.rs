mod hashing;
mod jwt;

pub use hashing::PasswordHasher;
pub use jwt::{Claims, JwtService, TokenKind, TokenPair};
