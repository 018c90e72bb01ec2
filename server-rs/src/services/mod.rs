pub mod approval;
pub mod directory;
pub mod listing;
pub mod membership;
pub mod stripe_service;
