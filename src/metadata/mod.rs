//! ECMA-335 structures needed for strong-name signing.
//!
//! Only the CLI header is modelled here: it locates the strong-name signature slot and holds
//! the `Flags` bitfield that records whether an image is strong-name signed.

pub mod cor20header;
