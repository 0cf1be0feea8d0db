use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{MonitorError, MonitorResult};

use super::launcher::ProgramLauncher;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    Reminder,
    BadPosture,
}

/// A notifier that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertFired {
    pub kind: AlertKind,
    pub program: PathBuf,
}

/// Interval gate for the periodic reminder.
#[derive(Debug, Clone)]
pub struct ReminderTimer {
    enabled: bool,
    interval: Duration,
    last_fired: Instant,
}

impl ReminderTimer {
    pub fn new(enabled: bool, interval_minutes: u32, now: Instant) -> Self {
        Self {
            enabled,
            interval: minutes(interval_minutes),
            last_fired: now,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.enabled && now.saturating_duration_since(self.last_fired) >= self.interval
    }

    pub fn mark_fired(&mut self, now: Instant) {
        self.last_fired = now;
    }

    /// Turning the reminder on starts a fresh interval; there is no catch-up fire.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if enabled && !self.enabled {
            self.last_fired = now;
        }
        self.enabled = enabled;
    }

    pub fn set_interval(&mut self, interval_minutes: u32, now: Instant) {
        self.interval = minutes(interval_minutes);
        self.last_fired = now;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn minutes(value: u32) -> Duration {
    let clamped = value.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
    Duration::from_secs(u64::from(clamped) * 60)
}

/// Drives both notifier programs.
///
/// The reminder fires from [`AlertScheduler::tick`] once its interval has
/// elapsed. The bad-posture notifier fires every time the classifier asks,
/// including on consecutive bad ticks.
pub struct AlertScheduler {
    launcher: Arc<dyn ProgramLauncher>,
    reminder: ReminderTimer,
    reminder_program: Option<PathBuf>,
    bad_posture_program: Option<PathBuf>,
}

impl AlertScheduler {
    pub fn new(launcher: Arc<dyn ProgramLauncher>, reminder: ReminderTimer) -> Self {
        Self {
            launcher,
            reminder,
            reminder_program: None,
            bad_posture_program: None,
        }
    }

    pub fn with_programs(mut self, reminder: &str, bad_posture: &str) -> Self {
        self.set_reminder_program(reminder);
        self.set_bad_posture_program(bad_posture);
        self
    }

    /// An empty path disables the reminder.
    pub fn set_reminder_program(&mut self, program: &str) {
        self.reminder_program = non_empty_path(program);
    }

    /// An empty path disables the bad-posture notifier.
    pub fn set_bad_posture_program(&mut self, program: &str) {
        self.bad_posture_program = non_empty_path(program);
    }

    pub fn reminder(&self) -> &ReminderTimer {
        &self.reminder
    }

    pub fn reminder_mut(&mut self) -> &mut ReminderTimer {
        &mut self.reminder
    }

    /// Fire the reminder if it is enabled, configured and due.
    ///
    /// The interval restarts even when the launch fails, so a broken path
    /// produces one warning per interval rather than one per tick.
    pub fn tick(&mut self, now: Instant) -> Option<MonitorResult<AlertFired>> {
        let program = self.reminder_program.clone()?;
        if !self.reminder.is_due(now) {
            return None;
        }
        self.reminder.mark_fired(now);

        if !program.exists() {
            log_warn!("reminder program {} does not exist", program.display());
            return Some(Err(MonitorError::Launch {
                path: program,
                reason: "file not found".to_string(),
            }));
        }

        Some(self.fire(AlertKind::Reminder, program))
    }

    /// Fire the bad-posture notifier, if one is configured.
    pub fn launch_bad_posture(&self) -> Option<MonitorResult<AlertFired>> {
        let program = self.bad_posture_program.clone()?;
        Some(self.fire(AlertKind::BadPosture, program))
    }

    fn fire(&self, kind: AlertKind, program: PathBuf) -> MonitorResult<AlertFired> {
        match self.launcher.launch(&program) {
            Ok(()) => {
                log_info!("{:?} notifier launched: {}", kind, program.display());
                Ok(AlertFired { kind, program })
            }
            Err(err) => {
                log_warn!("{:?} notifier failed: {err}", kind);
                Err(err)
            }
        }
    }
}

fn non_empty_path(program: &str) -> Option<PathBuf> {
    let trimmed = program.trim();
    (!trimmed.is_empty()).then(|| Path::new(trimmed).to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records launches instead of starting processes.
    #[derive(Default)]
    pub(crate) struct RecordingLauncher {
        pub launched: Mutex<Vec<PathBuf>>,
        pub fail: bool,
    }

    impl RecordingLauncher {
        pub(crate) fn count(&self) -> usize {
            self.launched.lock().unwrap().len()
        }
    }

    impl ProgramLauncher for RecordingLauncher {
        fn launch(&self, program: &Path) -> MonitorResult<()> {
            if self.fail {
                return Err(MonitorError::Launch {
                    path: program.to_path_buf(),
                    reason: "refused".into(),
                });
            }
            self.launched.lock().unwrap().push(program.to_path_buf());
            Ok(())
        }
    }

    fn scheduler(
        launcher: Arc<RecordingLauncher>,
        enabled: bool,
        interval: u32,
        now: Instant,
    ) -> AlertScheduler {
        AlertScheduler::new(launcher, ReminderTimer::new(enabled, interval, now))
    }

    #[test]
    fn reminder_fires_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("toast.exe");
        std::fs::write(&program, b"").unwrap();

        let start = Instant::now();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut alerts = scheduler(launcher.clone(), true, 2, start);
        alerts.set_reminder_program(program.to_str().unwrap());

        assert!(alerts.tick(start + Duration::from_secs(119)).is_none());
        let fired = alerts.tick(start + Duration::from_secs(120)).unwrap().unwrap();
        assert_eq!(fired.kind, AlertKind::Reminder);
        assert_eq!(fired.program, program);

        assert!(alerts.tick(start + Duration::from_secs(121)).is_none());
        assert!(alerts.tick(start + Duration::from_secs(240)).is_some());
        assert_eq!(launcher.count(), 2);
    }

    #[test]
    fn reminder_needs_flag_and_program() {
        let start = Instant::now();
        let later = start + Duration::from_secs(3600);
        let launcher = Arc::new(RecordingLauncher::default());

        let mut no_program = scheduler(launcher.clone(), true, 1, start);
        assert!(no_program.tick(later).is_none());

        let mut disabled = scheduler(launcher.clone(), false, 1, start);
        disabled.set_reminder_program("/usr/bin/true");
        assert!(disabled.tick(later).is_none());

        assert_eq!(launcher.count(), 0);
    }

    #[test]
    fn enabling_restarts_the_interval() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("toast");
        std::fs::write(&program, b"").unwrap();

        let start = Instant::now();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut alerts = scheduler(launcher.clone(), false, 1, start);
        alerts.set_reminder_program(program.to_str().unwrap());

        let enabled_at = start + Duration::from_secs(600);
        alerts.reminder_mut().set_enabled(true, enabled_at);
        assert!(alerts.tick(enabled_at).is_none());
        assert!(alerts.tick(enabled_at + Duration::from_secs(59)).is_none());
        assert!(alerts.tick(enabled_at + Duration::from_secs(60)).is_some());
    }

    #[test]
    fn changing_interval_restarts_the_interval() {
        let start = Instant::now();
        let mut timer = ReminderTimer::new(true, 1, start);
        let changed_at = start + Duration::from_secs(55);
        timer.set_interval(5, changed_at);

        assert_eq!(timer.interval(), Duration::from_secs(300));
        assert!(!timer.is_due(start + Duration::from_secs(120)));
        assert!(timer.is_due(changed_at + Duration::from_secs(300)));
    }

    #[test]
    fn interval_is_clamped() {
        let now = Instant::now();
        assert_eq!(ReminderTimer::new(true, 0, now).interval(), Duration::from_secs(60));
        assert_eq!(ReminderTimer::new(true, 500, now).interval(), Duration::from_secs(3600));
    }

    #[test]
    fn missing_reminder_program_warns_and_waits_for_next_interval() {
        let start = Instant::now();
        let launcher = Arc::new(RecordingLauncher::default());
        let mut alerts = scheduler(launcher.clone(), true, 1, start);
        alerts.set_reminder_program("/no/such/toast.exe");

        let due = start + Duration::from_secs(60);
        assert!(matches!(alerts.tick(due), Some(Err(MonitorError::Launch { .. }))));
        assert!(alerts.tick(due + Duration::from_secs(1)).is_none());
        assert_eq!(launcher.count(), 0);
    }

    #[test]
    fn bad_posture_fires_every_time() {
        let launcher = Arc::new(RecordingLauncher::default());
        let alerts = scheduler(launcher.clone(), false, 1, Instant::now())
            .with_programs("", "/opt/sit-up");

        for _ in 0..3 {
            let fired = alerts.launch_bad_posture().unwrap().unwrap();
            assert_eq!(fired.kind, AlertKind::BadPosture);
        }
        assert_eq!(launcher.count(), 3);
    }

    #[test]
    fn launch_failure_is_returned_not_raised() {
        let launcher = Arc::new(RecordingLauncher {
            fail: true,
            ..Default::default()
        });
        let alerts = scheduler(launcher, false, 1, Instant::now()).with_programs("", "/opt/sit-up");
        assert!(matches!(
            alerts.launch_bad_posture(),
            Some(Err(MonitorError::Launch { .. }))
        ));
        assert!(scheduler(Arc::new(RecordingLauncher::default()), false, 1, Instant::now())
            .launch_bad_posture()
            .is_none());
    }
}
