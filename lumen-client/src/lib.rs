//! Lumen client library
//!
//! Keeps one authenticated connection to a media server alive for the rest
//! of an application. The pieces, leaves first:
//!
//! - [`credentials`]: encrypted username/password storage used for silent
//!   re-authentication.
//! - [`session`]: the observable session cell and the [`SessionManager`]
//!   that is its only writer (login, re-authentication, logout).
//! - [`factory`]: caches one transport client per (server, token) and
//!   serializes its construction.
//! - [`executor`]: runs remote operations, re-authenticating and retrying
//!   once when the server rejects the token.
//! - [`repository`]: the domain facade the rest of an application calls.
//!
//! [`transport`] is the boundary to the server SDK; [`testing`] contains a
//! scripted in-memory transport for tests and demos.

pub mod credentials;
pub mod error;
pub mod executor;
pub mod factory;
pub mod repository;
pub mod session;
pub mod testing;
pub mod transport;

pub use credentials::{
    CredentialError, CredentialStore, EncryptedCredentialStore,
    MemoryCredentialStore, SecureCredential, credential_key,
};
pub use error::{ClientError, ClientResult};
pub use executor::{AuthRetryExecutor, DEFAULT_MAX_AUTH_RETRIES, SessionClient};
pub use factory::ClientFactory;
pub use repository::{MediaRepository, RepositoryError, RepositoryResult};
pub use session::{SessionManager, SessionState, SessionStore};
pub use transport::{
    HttpMediaClient, HttpTransport, MediaClient, Transport,
    normalize_server_url,
};
