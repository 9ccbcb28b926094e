pub mod auth;
pub mod features;
