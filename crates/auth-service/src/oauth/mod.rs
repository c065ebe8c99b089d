//! OAuth 2.0 endpoints

pub mod authorize;
pub mod federated;
mod html;
pub mod revoke;
pub mod token;
