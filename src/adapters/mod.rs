pub mod database;
pub mod redis;
pub mod smtp;
