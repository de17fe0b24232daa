pub mod audio_format;
pub mod capture_models;
pub mod config;
pub mod device;
pub mod error;
pub mod message;
pub mod message_type;
pub mod state;
