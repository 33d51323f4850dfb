//! # dotsign Prelude
//!
//! Import this module to get the types needed to load a key and sign images.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotsign operations
pub use crate::Error;

/// The result type used throughout dotsign
pub use crate::Result;

// ================================================================================================
// Signing
// ================================================================================================

/// Key loading and signing entry points
pub use crate::strongname::{
    sign_files, SignOptions, SignOutcome, SignResult, StrongNameKey, StrongNameSigner,
};

/// Cooperative cancellation for batches
pub use crate::utils::CancellationToken;

// ================================================================================================
// Low-level Access
// ================================================================================================

/// PE loading and header facts
pub use crate::file::{headers::PeHeaderMetadata, File};

/// Bounds-checked little-endian reader
pub use crate::Parser;

/// CLI header and flags
pub use crate::metadata::cor20header::{Cor20Header, CorFlags};
