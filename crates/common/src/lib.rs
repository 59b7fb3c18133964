//! Data model shared by every teamsync crate.

pub mod types;

pub use types::{ChannelLink, LocalPost, link_key};
