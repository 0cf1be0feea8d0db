pub mod classifier;
pub mod event;

pub use classifier::{Classification, PostureClassifier, DEFAULT_GOOD_THRESHOLD};
pub use event::{now_time, PostureEvent, PostureStatus};
