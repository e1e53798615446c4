pub mod auth;
pub mod health;
pub mod triggers;
pub mod users;
