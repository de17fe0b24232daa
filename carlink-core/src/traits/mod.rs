pub mod bulk_device;
pub mod packet_recorder;
pub mod replay_callback;
pub mod sinks;
pub mod transport_delegate;
