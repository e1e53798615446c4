//! Record types: the application document observed by the triggers and the
//! user profile stored locally.

pub mod application;
pub mod user_profile;

pub use self::application::*;
pub use self::user_profile::*;
