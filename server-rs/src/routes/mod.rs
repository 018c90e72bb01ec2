pub mod admin;
pub mod auth;
pub mod clubs;
pub mod facilities;
pub mod health;
pub mod me;
pub mod plans;
pub mod requests;
pub mod stripe_connect;
pub mod submissions;
pub mod webhooks;
