//! Per-vendor credential acquisition.
//!
//! Three mutually exclusive strategies, selected at adapter construction:
//! a static bearer token sent verbatim on every call (no lifecycle, handled
//! inline by each adapter), per-request HMAC signing over a canonical
//! string ([`signing`]), and token exchange with a cached, single-flight
//! refresh ([`token`]).

pub mod signing;
pub mod token;

pub use signing::{RequestSigner, SignedAuth};
pub use token::{ExchangedToken, TokenCache};
