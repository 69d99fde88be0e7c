//! Credential handling: password hashing, session JWTs, one-time tokens.

pub mod jwt;
pub mod password;
pub mod token;

pub use jwt::*;
pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token signature invalid")]
    TokenSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Signing key rejected: {0}")]
    InvalidKey(String),

    #[error("Claims could not be encoded: {0}")]
    Encoding(String),
}
