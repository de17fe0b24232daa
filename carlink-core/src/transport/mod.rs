pub mod dispatcher;
pub mod reader;
