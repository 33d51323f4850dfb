//! Synchronization utilities for multi-threaded signing.
//!
//! # Key Components
//!
//! - [`CancellationToken`] - A cloneable, cooperative cancellation flag shared by every file of a batch
//!
//! The token carries no locks. Workers poll it before each read and write, so a tripped token
//! stops a batch at the next I/O boundary of every file in flight.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{Error, Result};

/// A cooperative cancellation signal.
///
/// Clones share the same underlying flag. Cancelling is sticky: once tripped, the token stays
/// cancelled for its whole lifetime.
///
/// # Examples
///
/// ```rust
/// use dotsign::utils::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
///
/// assert!(token.check().is_ok());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token for every clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` if the token was tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns [`Error::Cancelled`] if the token was tripped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] after [`CancellationToken::cancel`] was called on any clone.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
