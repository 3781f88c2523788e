//! posebridge-osc/src/oscquery/mod.rs
//!
//! Client-side OSCQuery: the JSON models a queried service answers with and
//! the HTTP client that fetches them. The mDNS announcement side lives in
//! the external discovery collaborator, not here.

pub mod client;
pub mod models;

pub use client::{OscQueryApi, OscQueryClient};
pub use models::{OscQueryHostInfo, OscQueryNode};
