pub mod index;
pub mod injector;
pub mod recorder;
pub mod replay;
