use chrono::NaiveTime;

use crate::alerts::{AlertFired, AlertScheduler};
use crate::channels::SensorRecord;
use crate::error::MonitorResult;

use super::event::{now_time, PostureEvent, PostureStatus};

pub const DEFAULT_GOOD_THRESHOLD: f64 = 6000.0;

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub event: PostureEvent,
    /// Set when the bad-posture notifier was attempted.
    pub alert: Option<MonitorResult<AlertFired>>,
}

/// Sitting is "good" when the summed pressure reaches the threshold.
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    good_threshold: f64,
    alert_enabled: bool,
}

impl PostureClassifier {
    pub fn new(good_threshold: f64, alert_enabled: bool) -> Self {
        Self {
            good_threshold,
            alert_enabled,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.good_threshold
    }

    pub fn alert_enabled(&self) -> bool {
        self.alert_enabled
    }

    pub fn set_alert_enabled(&mut self, enabled: bool) {
        self.alert_enabled = enabled;
    }

    /// Inclusive on the good side.
    pub fn status_for(&self, aggregate: f64) -> PostureStatus {
        if aggregate >= self.good_threshold {
            PostureStatus::Good
        } else {
            PostureStatus::Bad
        }
    }

    pub fn evaluate(&self, record: &SensorRecord) -> PostureEvent {
        self.evaluate_at(record, now_time())
    }

    pub fn evaluate_at(&self, record: &SensorRecord, time: NaiveTime) -> PostureEvent {
        let aggregate = record.aggregate();
        PostureEvent::new(time, self.status_for(aggregate), aggregate)
    }

    /// Evaluate and, on a bad reading with alerts enabled, launch the notifier.
    ///
    /// Consecutive bad readings each launch it again.
    pub fn classify(
        &self,
        record: &SensorRecord,
        time: NaiveTime,
        alerts: &AlertScheduler,
    ) -> Classification {
        let event = self.evaluate_at(record, time);
        let alert = if event.status == PostureStatus::Bad && self.alert_enabled {
            alerts.launch_bad_posture()
        } else {
            None
        };
        Classification { event, alert }
    }
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_GOOD_THRESHOLD, true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::alerts::scheduler::tests::RecordingLauncher;
    use crate::alerts::ReminderTimer;
    use crate::channels::Channel;

    fn record_with_total(total: f64) -> SensorRecord {
        // Spread over a few pads so the sum is what matters, not one channel.
        let mut values = BTreeMap::new();
        values.insert(Channel::LeftHip, total / 2.0);
        values.insert(Channel::RightHip, total / 4.0);
        values.insert(Channel::SpineBottom, total / 4.0);
        SensorRecord::new(0, values)
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn threshold_is_inclusive_on_good_side() {
        let classifier = PostureClassifier::default();
        assert_eq!(
            classifier.evaluate_at(&record_with_total(6000.0), noon()).status,
            PostureStatus::Good
        );
        assert_eq!(
            classifier.evaluate_at(&record_with_total(5999.9), noon()).status,
            PostureStatus::Bad
        );
    }

    #[test]
    fn event_carries_aggregate_and_time() {
        let classifier = PostureClassifier::new(100.0, false);
        let event = classifier.evaluate_at(&record_with_total(80.0), noon());
        assert_eq!(event.pressure, 80.0);
        assert_eq!(event.time, noon());
        assert_eq!(event.status, PostureStatus::Bad);
    }

    #[test]
    fn bad_reading_launches_notifier_each_time() {
        let launcher = Arc::new(RecordingLauncher::default());
        let alerts = AlertScheduler::new(launcher.clone(), ReminderTimer::new(false, 1, Instant::now()))
            .with_programs("", "/opt/sit-up");
        let classifier = PostureClassifier::default();

        for _ in 0..2 {
            let outcome = classifier.classify(&record_with_total(10.0), noon(), &alerts);
            assert!(matches!(outcome.alert, Some(Ok(_))));
        }
        let good = classifier.classify(&record_with_total(7000.0), noon(), &alerts);
        assert!(good.alert.is_none());
        assert_eq!(launcher.count(), 2);
    }

    #[test]
    fn disabled_alert_never_launches() {
        let launcher = Arc::new(RecordingLauncher::default());
        let alerts = AlertScheduler::new(launcher.clone(), ReminderTimer::new(false, 1, Instant::now()))
            .with_programs("", "/opt/sit-up");
        let mut classifier = PostureClassifier::default();
        classifier.set_alert_enabled(false);

        let outcome = classifier.classify(&record_with_total(10.0), noon(), &alerts);
        assert_eq!(outcome.event.status, PostureStatus::Bad);
        assert!(outcome.alert.is_none());
        assert_eq!(launcher.count(), 0);
    }
}
