/// Business logic: token lifecycle, session orchestration, maintenance
pub mod maintenance;
pub mod session_manager;
pub mod token_service;

pub use session_manager::{
    client_fingerprint, AuthenticatedSession, IdentityAssertion, SessionManager,
};
pub use token_service::{TokenPair, TokenService};
