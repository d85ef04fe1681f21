//! HTTP handlers, grouped by resource.

pub mod documents;
pub mod orders;
pub mod products;
pub mod system;
