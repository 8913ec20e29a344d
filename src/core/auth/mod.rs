//! Bearer credential management.
//!
//! [`TokenProvider`] exchanges the long-lived refresh token for short-lived access
//! tokens at the Login With Amazon endpoint and caches the result for the configured
//! refresh margin. The rest of the crate consumes tokens through the [`TokenSource`]
//! trait so the connection layer can be exercised without an authorization server.

mod token;

pub use token::{Token, TokenProvider, TokenSource};
