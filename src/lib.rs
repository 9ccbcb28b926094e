pub mod audit;
pub mod auth;
pub mod billing;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod store;
pub mod tenant;
