pub mod capture_format;
pub mod ring_buffer;
