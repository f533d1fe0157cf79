/// Animation sequence decompression into per-bone key tracks
pub mod anim;
/// Fixed-point, interval, delta and mini-float decoders
pub mod codecs;
/// Version context and the positioned byte cursor
pub mod data;
/// Recoverable problems reported while decoding
pub mod diagnostics;
/// Error definitions
pub mod error;
/// Mesh record layouts for every supported format revision and title
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// Welded skeletal meshes and unified static meshes built from decoded records
pub mod reconstruct;
/// Rule tables that pick a record layout for a version context
pub mod schema;

#[cfg(test)]
pub(crate) mod test_util;
