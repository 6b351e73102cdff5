pub mod digest;
pub mod paths;

pub use digest::{canonical_digest, canonical_json, sha256_hex};
pub use paths::resolve_path;
