pub mod decoder;
pub mod receiver;

pub use decoder::{Frames, StreamDecoder};
pub use receiver::{ConnectionState, ReceiverConfig, TelemetryEvent, TelemetryReceiver};
