pub mod auth;
pub mod config;
pub mod control;
pub mod device;
pub mod reading_cache;
pub mod rfid;
pub mod sensors;
pub mod session;
