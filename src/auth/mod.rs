//! Credentials, tokens and the authorization pipeline.

pub mod identity;
pub mod password;
pub mod permissions;
pub mod pipeline;
pub mod token;
pub mod tokens;

pub use identity::Identity;
pub use password::{CredentialError, CredentialVerifier};
pub use permissions::{MoviesRead, MoviesWrite, PermissionCode, Permissions};
pub use pipeline::{AuthError, Requirement, authorize, identify};
pub use token::{Scope, Token, TokenResponse};
pub use tokens::{TokenError, TokenManager};
