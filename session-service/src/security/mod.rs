/// Token payloads, signing, and the revocation fast path
pub mod claims;
pub mod revocation_cache;
pub mod token_codec;

pub use claims::{Claims, TokenKind};
pub use revocation_cache::RevocationCache;
pub use token_codec::TokenCodec;
