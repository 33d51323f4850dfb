// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # dotsign
//!
//! Strong-name signing for .NET assemblies, in pure Rust.
//!
//! `dotsign` fills the strong-name signature slot of a delay-signed .NET PE image with an RSA
//! signature computed from a `.snk` key file, exactly as the platform signing tools do, and
//! marks the image as strong-name signed. It runs on any platform Rust supports and needs
//! neither Windows nor the .NET SDK.
//!
//! ## Features
//!
//! - **Key files** - Decodes CryptoAPI `PRIVATEKEYBLOB` strong-name keys, wiping them on drop
//! - **ECMA-335 hashing** - Selects the signed byte ranges per Partition II.6.2.1.3
//! - **In-place patching** - Changes only the CLI header flag byte and the signature slot
//! - **Batch signing** - Parallel signing with per-file results and cooperative cancellation
//! - **Verification** - Checks stored signatures against a key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotsign::prelude::*;
//! use std::path::Path;
//!
//! let key = StrongNameKey::from_file(Path::new("key.snk"))?;
//! let signer = StrongNameSigner::new(&key, SignOptions::default());
//!
//! match signer.sign(Path::new("MyAssembly.dll"))? {
//!     Some(result) => println!("wrote {} signature bytes", result.signature.len()),
//!     None => println!("assembly has no strong name slot"),
//! }
//! # Ok::<(), dotsign::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Memory-mapped PE loading and the header facts signing depends on
//! - [`metadata`] - The CLI header and its flags
//! - [`strongname`] - Key decoding, range selection, hashing, signing and patching
//! - [`utils`] - Alignment arithmetic and the cancellation token
//!
//! ## Standards Compliance
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Partition II.6.2.1.3 and II.25.3.3
//! - [PE Format](https://learn.microsoft.com/en-us/windows/win32/debug/pe-format) - Microsoft PE/COFF specification
//!
//! Images with a non-zero PE checksum or an Authenticode certificate table are rejected.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). An image that simply has no reserved
//! slot is not an error:
//!
//! ```rust,no_run
//! use dotsign::{Error, SignOptions, StrongNameKey, StrongNameSigner};
//! use std::path::Path;
//!
//! let key = StrongNameKey::from_file(Path::new("key.snk"))?;
//! let signer = StrongNameSigner::new(&key, SignOptions::default());
//!
//! match signer.sign(Path::new("app.exe")) {
//!     Ok(Some(_)) => println!("signed"),
//!     Ok(None) => println!("not eligible"),
//!     Err(Error::UnsupportedPeFeature(message)) => println!("re-link first: {}", message),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! # Ok::<(), dotsign::Error>(())
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run keyblob --release
//! cargo +nightly fuzz run file --release -- -jobs=4 -fork=1
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```
#[macro_use]
pub(crate) mod error;

/// PE image loading and the owned header facts used for signing.
pub mod file;

/// The ECMA-335 CLI header.
pub mod metadata;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotsign::prelude::*;
///
/// let key = StrongNameKey::from_file(std::path::Path::new("key.snk"))?;
/// println!("token {:02x?}", key.public_key_token()?);
/// # Ok::<(), dotsign::Error>(())
/// ```
pub mod prelude;

pub mod strongname;

/// Shared helpers.
pub mod utils;

/// `dotsign` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotsign` Error type
///
/// See [`error::Error`](crate::Error) for the individual variants.
pub use error::Error;

/// Low-level file and memory parsing utilities.
///
/// # Example
///
/// ```rust
/// use dotsign::Parser;
///
/// let data = [0x00, 0x24, 0x00, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u32>()?, 0x2400);
/// # Ok::<(), dotsign::Error>(())
/// ```
pub use file::{parser::Parser, File};

/// Signing entry points.
pub use strongname::{
    sign_files, SignOptions, SignOutcome, SignResult, StrongNameKey, StrongNameSigner,
};

pub use utils::CancellationToken;
