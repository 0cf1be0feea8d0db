pub mod controller;
pub mod tick_loop;

pub use controller::{MonitorConfig, MonitorEvent, PostureMonitor, TickReport};
pub use tick_loop::{run_render_loop, run_tick_loop};
