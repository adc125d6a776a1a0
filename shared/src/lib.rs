//! Wire types and configuration shared by the generation client.
//!
//! Everything here mirrors the backend's JSON contract exactly; field
//! renames live on the types, not at the call sites.

pub mod config;
pub mod types;
