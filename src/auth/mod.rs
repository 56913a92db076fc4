//! Authentication module for the session server
//!
//! Validates and encodes identifiers, mints tokens, and orchestrates the
//! sign-up / authenticate / sign-out flows over the credential and token
//! stores.

pub mod encoding;
pub mod handlers;
mod service;
mod token;
mod validator;

pub use encoding::{decode, encode};
pub use service::SessionService;
pub use token::{TokenGenerator, TokenSource, TOKEN_LENGTH};
#[cfg(test)]
pub use token::MockTokenSource;
pub use validator::Validator;
