//! Services layer for identity-service.
//!
//! Key management, federated sign-in and the session lifecycle, on top of
//! the [`store::Store`] contract.

pub mod api_key;
pub mod checksum;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod providers;
pub mod session;
pub mod signin;
pub mod store;

pub use api_key::ApiKeyManager;
pub use checksum::Checksum;
pub use error::AuthError;
pub use identity::IdentityResolver;
pub use jwt::{JwtService, SignedToken, TokenClaims, TokenError, TokenKind};
pub use session::SessionManager;
pub use signin::{SignInResult, SigninOrchestrator};
pub use store::{in_transaction, CleanupReport, MemoryStore, PgStore, Store, StoreError, StoreTx};
