//! # api-adapters
//!
//! Adapters that reach the remote content service. Wire shapes and error
//! normalization are always compiled; the reqwest transport sits behind the
//! `http-reqwest` feature.

pub mod dto;
pub mod error;

#[cfg(feature = "http-reqwest")]
pub mod http;

#[cfg(feature = "http-reqwest")]
pub use http::HttpBackend;
