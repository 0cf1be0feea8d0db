pub mod launcher;
pub mod scheduler;

pub use launcher::{ProcessLauncher, ProgramLauncher};
pub use scheduler::{AlertFired, AlertKind, AlertScheduler, ReminderTimer};
