use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};

use crate::alerts::{AlertFired, AlertScheduler, ProgramLauncher, ReminderTimer};
use crate::channels::SensorRecord;
use crate::error::{MonitorError, MonitorResult};
use crate::history::HistoryLog;
use crate::posture::{now_time, PostureClassifier, PostureEvent, DEFAULT_GOOD_THRESHOLD};
use crate::settings::SettingsStore;
use crate::store::SampleStoreHandle;
use crate::telemetry::{ConnectionState, ReceiverConfig, TelemetryEvent, TelemetryReceiver};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub good_threshold: f64,
    pub window_capacity: usize,
    pub tick_interval: Duration,
    pub reminder_enabled: bool,
    pub receiver: ReceiverConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            good_threshold: DEFAULT_GOOD_THRESHOLD,
            window_capacity: 100,
            tick_interval: Duration::from_secs(1),
            reminder_enabled: true,
            receiver: ReceiverConfig::default(),
        }
    }
}

/// What subscribers see, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    RecordReceived(SensorRecord),
    Classified(PostureEvent),
    AlertFired(AlertFired),
    Error(MonitorError),
    ConnectionStateChanged(ConnectionState),
}

/// Outcome of one [`PostureMonitor::tick`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub classified: Vec<PostureEvent>,
    pub alerts: Vec<AlertFired>,
    pub errors: Vec<MonitorError>,
    pub state_changes: Vec<ConnectionState>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.classified.is_empty()
            && self.alerts.is_empty()
            && self.errors.is_empty()
            && self.state_changes.is_empty()
    }
}

/// Foreground half of the pipeline.
///
/// The receiver's task only produces events. Everything that mutates state
/// (sample windows, classification, alerts, history) happens here, on the
/// caller's tick, in the order the records were decoded.
pub struct PostureMonitor {
    receiver: TelemetryReceiver,
    telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    store: SampleStoreHandle,
    classifier: PostureClassifier,
    alerts: AlertScheduler,
    history: HistoryLog,
    settings: Arc<SettingsStore>,
    subscribers: broadcast::Sender<MonitorEvent>,
    current: Option<PostureEvent>,
}

impl PostureMonitor {
    pub fn new(
        config: &MonitorConfig,
        settings: Arc<SettingsStore>,
        history: HistoryLog,
        launcher: Arc<dyn ProgramLauncher>,
    ) -> Self {
        let (receiver, telemetry_rx) = TelemetryReceiver::new(config.receiver.clone());
        let saved = settings.snapshot();

        let classifier = PostureClassifier::new(config.good_threshold, saved.bad_posture_alert_active);
        let reminder = ReminderTimer::new(config.reminder_enabled, saved.toast_interval, Instant::now());
        let alerts = AlertScheduler::new(launcher, reminder)
            .with_programs(&saved.toast_app, &saved.bad_posture_app);
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CAPACITY);

        Self {
            receiver,
            telemetry_rx,
            store: SampleStoreHandle::new(config.window_capacity),
            classifier,
            alerts,
            history,
            settings,
            subscribers,
            current: None,
        }
    }

    /// Connect and start receiving. Remembers the server on success.
    pub async fn connect(&mut self, host: &str, port: u16) -> MonitorResult<()> {
        self.receiver.connect(host, port).await?;

        if let Err(err) = self.receiver.start() {
            let err = MonitorError::Connection {
                addr: format!("{host}:{port}"),
                reason: format!("{err:#}"),
            };
            log_error!("{err}");
            return Err(err);
        }

        if let Err(err) = self
            .settings
            .set_last_server(host, port)
            .and_then(|_| self.settings.add_saved_server(host, port))
        {
            log_warn!("could not remember server {host}:{port}: {err:#}");
        }
        Ok(())
    }

    /// Stop receiving, process whatever was already decoded, then clear the
    /// sample windows and current status.
    pub async fn disconnect(&mut self) -> Result<TickReport> {
        let stopped = self.receiver.stop().await;
        let mut report = TickReport::default();
        self.drain_telemetry(&mut report);
        self.store.reset();
        self.current = None;
        stopped.map(|()| report)
    }

    /// Drain everything the receiver produced since the last tick, then
    /// check the reminder timer.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.drain_telemetry(&mut report);

        match self.alerts.tick(now) {
            Some(Ok(fired)) => {
                report.alerts.push(fired.clone());
                self.publish(MonitorEvent::AlertFired(fired));
            }
            Some(Err(err)) => self.report_error(err, &mut report),
            None => {}
        }

        report
    }

    fn handle_record(&mut self, record: SensorRecord, report: &mut TickReport) {
        self.store.append(&record);
        let classification = self.classifier.classify(&record, now_time(), &self.alerts);
        self.publish(MonitorEvent::RecordReceived(record));

        let event = classification.event;
        if let Err(err) = self.history.append(event.clone()) {
            log_error!("history write failed: {err}");
            self.report_error(err, report);
        }
        self.current = Some(event.clone());
        report.classified.push(event.clone());
        self.publish(MonitorEvent::Classified(event));

        match classification.alert {
            Some(Ok(fired)) => {
                report.alerts.push(fired.clone());
                self.publish(MonitorEvent::AlertFired(fired));
            }
            Some(Err(err)) => self.report_error(err, report),
            None => {}
        }
    }

    fn report_error(&self, err: MonitorError, report: &mut TickReport) {
        report.errors.push(err.clone());
        self.publish(MonitorEvent::Error(err));
    }

    /// Handle queued receiver events in the order they were produced.
    fn drain_telemetry(&mut self, report: &mut TickReport) {
        while let Ok(event) = self.telemetry_rx.try_recv() {
            match event {
                TelemetryEvent::Record(record) => self.handle_record(record, report),
                TelemetryEvent::Error(err) => self.report_error(err, report),
                TelemetryEvent::StateChanged(state) => {
                    report.state_changes.push(state);
                    self.publish(MonitorEvent::ConnectionStateChanged(state));
                }
            }
        }
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.subscribers.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.subscribers.subscribe()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.receiver.watch_state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.receiver.state()
    }

    /// Read handle for renderers.
    pub fn store(&self) -> SampleStoreHandle {
        self.store.clone()
    }

    pub fn current_status(&self) -> Option<&PostureEvent> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn classifier(&self) -> &PostureClassifier {
        &self.classifier
    }

    pub fn alerts(&self) -> &AlertScheduler {
        &self.alerts
    }

    pub fn clear_history(&mut self) -> MonitorResult<()> {
        self.history.clear()
    }

    pub fn export_history(&self, target: &Path) -> MonitorResult<usize> {
        self.history.export_csv(target)
    }

    pub fn set_reminder_enabled(&mut self, enabled: bool, now: Instant) {
        self.alerts.reminder_mut().set_enabled(enabled, now);
    }

    pub fn set_reminder_interval(&mut self, minutes: u32, now: Instant) -> Result<()> {
        let stored = self.settings.set_reminder_interval(minutes)?;
        self.alerts.reminder_mut().set_interval(stored, now);
        Ok(())
    }

    pub fn set_reminder_program(&mut self, program: &str) -> Result<()> {
        self.settings.set_toast_app(program)?;
        self.alerts.set_reminder_program(program);
        Ok(())
    }

    pub fn set_bad_posture_program(&mut self, program: &str) -> Result<()> {
        self.settings.set_bad_posture_app(program)?;
        self.alerts.set_bad_posture_program(program);
        Ok(())
    }

    pub fn set_bad_posture_alert(&mut self, enabled: bool) -> Result<()> {
        self.settings.set_bad_posture_alert_active(enabled)?;
        self.classifier.set_alert_enabled(enabled);
        Ok(())
    }

    /// Stop the receiver, process what it already decoded, then flush
    /// history and settings.
    pub async fn shutdown(&mut self) -> Result<TickReport> {
        let stopped = self.receiver.stop().await;
        let mut report = TickReport::default();
        self.drain_telemetry(&mut report);
        self.history
            .persist()
            .context("failed to persist history on shutdown")?;
        self.settings.save().context("failed to persist settings on shutdown")?;
        log_info!("monitor shut down with {} history entries", self.history.len());
        stopped.map(|()| report)
    }
}
