pub mod encode;
pub mod header;
pub mod parser;
