//! HTTP handlers, one file per area.

pub mod auth;
pub mod billing;
pub mod organizations;
pub mod system;
