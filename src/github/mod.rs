//! Clients for the repository hosting provider.
//!
//! - [`repo_ref`]: parse repository URLs into owner/name.
//! - [`tree`]: resolve the default-branch tree through the REST API.
//! - [`fetch`]: download raw manifest content.

pub mod fetch;
pub mod repo_ref;
pub mod tree;
