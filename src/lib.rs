//! Tag-based image search against Moebooru style imageboards.
//!
//! The [`booru`] module holds the search pipeline; the binary wraps it in an
//! interactive terminal front end.

pub mod booru;
