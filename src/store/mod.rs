pub mod window;
pub mod windowed;

pub use window::ChannelWindow;
pub use windowed::{SampleStoreHandle, StoreSnapshot, WindowedSampleStore};
