use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! key_blob_error {
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedKeyBlob(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Key Errors
/// - [`Error::MalformedKeyBlob`] - The private key blob is shorter than its declared fields.
///   This is the only error that aborts a whole batch, because nothing can be signed without a key.
///
/// ## Per-File Errors
/// - [`Error::UnsupportedPeFeature`] - The image carries a checksum or an Authenticode certificate table
/// - [`Error::FileError`] - Filesystem I/O errors while hashing or patching
/// - [`Error::SigningError`] - The RSA primitive rejected the key material
/// - [`Error::Cancelled`] - The shared cancellation token was tripped
///
/// ## PE Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the data
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// A file without a reserved strong-name slot is **not** an error; the signing entry points
/// return `Ok(None)` for it.
///
/// # Examples
///
/// ```rust,no_run
/// use dotsign::{Error, StrongNameKey};
/// use std::path::Path;
///
/// match StrongNameKey::from_file(Path::new("key.snk")) {
///     Ok(key) => println!("Loaded a {}-bit key", key.bit_length()),
///     Err(Error::MalformedKeyBlob(message)) => eprintln!("Bad key file: {}", message),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The key blob is truncated.
    ///
    /// Raised when the blob is shorter than its 12-byte header plus the fields implied by the
    /// declared bit length. No cryptographic validation is performed on the key material, so a
    /// structurally complete but mathematically bogus key will not produce this error.
    #[error("Malformed key blob - {0}")]
    MalformedKeyBlob(String),

    /// The image uses a PE feature that strong-name signing cannot account for.
    ///
    /// Signing an image with a non-zero checksum or a populated certificate table would
    /// require excluding those regions from the hash. Such images have to be re-linked with
    /// both fields cleared.
    #[error("Unsupported PE feature - {0}")]
    UnsupportedPeFeature(String),

    /// The RSA primitive rejected the key material or failed to produce a signature.
    #[error("Signing failed - {0}")]
    SigningError(String),

    /// The operation observed a tripped cancellation token.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors from opening, seeking, reading, or writing the target image
    /// or the key file.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures, e.g. a failed memory mapping.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}

impl From<rsa::Error> for Error {
    fn from(error: rsa::Error) -> Self {
        Error::SigningError(error.to_string())
    }
}
