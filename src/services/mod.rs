pub mod auth;
pub mod dispatcher;
pub mod fcm;
pub mod init;
pub mod profiles;
pub mod push;
pub mod triggers;
