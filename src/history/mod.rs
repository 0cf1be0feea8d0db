use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, MonitorResult};
use crate::posture::PostureEvent;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Append-only record of classified readings, mirrored to a JSON file.
///
/// Every change rewrites the whole file. That is O(n) per append, which is
/// fine at one event per second but will not scale to much faster devices.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    events: Vec<PostureEvent>,
}

impl HistoryLog {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            events: Vec::new(),
        }
    }

    /// Rebuild the log from disk. A missing file is an empty log.
    pub fn load(path: impl Into<PathBuf>) -> MonitorResult<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(err) => return Err(MonitorError::persistence(&path, err)),
        };

        let events: Vec<PostureEvent> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&contents).map_err(|err| MonitorError::persistence(&path, err))?
        };

        log_info!("loaded {} history entries from {}", events.len(), path.display());
        Ok(Self { path, events })
    }

    /// [`HistoryLog::load`], falling back to an empty log if the file is unreadable.
    ///
    /// The broken file is left in place until the next append overwrites it.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(log) => log,
            Err(err) => {
                log_warn!("starting with empty history: {err}");
                Self::empty(path)
            }
        }
    }

    /// Record `event` and rewrite the file.
    ///
    /// The event is kept in memory even when the write fails.
    pub fn append(&mut self, event: PostureEvent) -> MonitorResult<()> {
        self.events.push(event);
        self.persist()
    }

    pub fn clear(&mut self) -> MonitorResult<()> {
        self.events.clear();
        self.persist()
    }

    pub fn persist(&self) -> MonitorResult<()> {
        let serialized = serde_json::to_string_pretty(&self.events)
            .map_err(|err| MonitorError::persistence(&self.path, err))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| MonitorError::persistence(parent, err))?;
        }

        // Write beside the target and rename so a crash never leaves half a file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized).map_err(|err| MonitorError::persistence(&staging, err))?;
        fs::rename(&staging, &self.path).map_err(|err| MonitorError::persistence(&self.path, err))
    }

    /// Write `time,status,pressure` rows to a CSV file.
    pub fn export_csv(&self, target: &Path) -> MonitorResult<usize> {
        let to_err = |err: csv::Error| MonitorError::persistence(target, err);

        let mut writer = csv::Writer::from_path(target).map_err(to_err)?;
        writer
            .write_record(["time", "status", "pressure"])
            .map_err(to_err)?;
        for event in &self.events {
            writer
                .write_record([
                    event.time_label(),
                    event.status.to_string(),
                    event.pressure_label(),
                ])
                .map_err(to_err)?;
        }
        writer
            .flush()
            .map_err(|err| MonitorError::persistence(target, err))?;

        log_info!("exported {} history rows to {}", self.events.len(), target.display());
        Ok(self.events.len())
    }

    pub fn events(&self) -> &[PostureEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::posture::PostureStatus;

    fn event(s: u32, status: PostureStatus, pressure: f64) -> PostureEvent {
        PostureEvent::new(NaiveTime::from_hms_opt(8, 0, s).unwrap(), status, pressure)
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::load(dir.path().join("posture_stats.json")).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn survives_restart_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posture_stats.json");
        let e1 = event(1, PostureStatus::Good, 6400.5);
        let e2 = event(2, PostureStatus::Bad, 3120.0);

        {
            let mut log = HistoryLog::load(&path).unwrap();
            log.append(e1.clone()).unwrap();
            log.append(e2.clone()).unwrap();
        }

        let reloaded = HistoryLog::load(&path).unwrap();
        assert_eq!(reloaded.events(), &[e1, e2]);
    }

    #[test]
    fn file_uses_log_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut log = HistoryLog::empty(&path);
        log.append(event(9, PostureStatus::Bad, 5999.9)).unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            serde_json::json!([{"time": "08:00:09", "status": "bad", "pressure": "5999.9"}])
        );
    }

    #[test]
    fn clear_persists_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut log = HistoryLog::empty(&path);
        log.append(event(0, PostureStatus::Good, 7000.0)).unwrap();
        log.clear().unwrap();

        assert!(HistoryLog::load(&path).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn corrupt_file_is_reported_and_fallback_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, "{ this is not history").unwrap();

        assert!(matches!(
            HistoryLog::load(&path),
            Err(MonitorError::Persistence { .. })
        ));
        assert!(HistoryLog::load_or_empty(&path).is_empty());
    }

    #[test]
    fn write_failure_keeps_event_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let mut log = HistoryLog::empty(&path);
        assert!(log.append(event(0, PostureStatus::Good, 6000.0)).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn exports_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = HistoryLog::empty(dir.path().join("stats.json"));
        log.append(event(1, PostureStatus::Good, 6100.0)).unwrap();
        log.append(event(2, PostureStatus::Bad, 42.3)).unwrap();

        let target = dir.path().join("export.csv");
        assert_eq!(log.export_csv(&target).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "time,status,pressure\n08:00:01,good,6100.0\n08:00:02,bad,42.3\n"
        );
    }
}
