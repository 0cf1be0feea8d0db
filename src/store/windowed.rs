use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::channels::{Channel, SensorRecord};

use super::window::ChannelWindow;

/// One [`ChannelWindow`] per sensor on a shared logical clock.
///
/// The clock advances once per record, so every window always has the same
/// length and origin, and a record that omits a channel still occupies a
/// tick in that channel's window (as 0).
#[derive(Debug, Clone)]
pub struct WindowedSampleStore {
    windows: Vec<ChannelWindow>,
    ticks: u64,
}

impl WindowedSampleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: Channel::ALL
                .iter()
                .map(|_| ChannelWindow::new(capacity))
                .collect(),
            ticks: 0,
        }
    }

    /// Append one record across all channels. Returns the logical time assigned.
    pub fn append(&mut self, record: &SensorRecord) -> u64 {
        let at = self.ticks;
        self.ticks += 1;

        for channel in Channel::ALL {
            self.windows[channel.index()].push(record.value(channel));
        }

        // Windows are aligned, so one answer applies to all of them.
        if let Some(count) = self.windows[0].overflow() {
            for window in &mut self.windows {
                window.compact(count);
            }
        }

        at
    }

    pub fn snapshot(&self, channel: Channel) -> Vec<(u64, f64)> {
        self.windows[channel.index()].points()
    }

    pub fn window(&self, channel: Channel) -> &ChannelWindow {
        &self.windows[channel.index()]
    }

    pub fn reset(&mut self) {
        for window in &mut self.windows {
            window.clear();
        }
        self.ticks = 0;
    }

    /// Records appended since the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn origin(&self) -> u64 {
        self.windows[0].origin()
    }

    pub fn len(&self) -> usize {
        self.windows[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows[0].is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.windows[0].capacity()
    }
}

/// Everything a renderer needs, taken under a single lock.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub origin: u64,
    pub ticks: u64,
    pub capacity: usize,
    pub channels: Vec<(Channel, Vec<(u64, f64)>)>,
}

impl StoreSnapshot {
    pub fn channel(&self, channel: Channel) -> &[(u64, f64)] {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, points)| points.as_slice())
            .unwrap_or(&[])
    }
}

/// Shared handle to the store.
///
/// The monitor holds the only writer; renderers clone the handle and read.
/// An append takes the write lock for all twelve channels at once, so a
/// reader never sees a half-applied record.
#[derive(Debug, Clone)]
pub struct SampleStoreHandle {
    inner: Arc<RwLock<WindowedSampleStore>>,
}

impl SampleStoreHandle {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WindowedSampleStore::new(capacity))),
        }
    }

    pub fn append(&self, record: &SensorRecord) -> u64 {
        self.write().append(record)
    }

    pub fn snapshot(&self, channel: Channel) -> Vec<(u64, f64)> {
        self.read().snapshot(channel)
    }

    pub fn snapshot_all(&self) -> StoreSnapshot {
        let guard = self.read();
        StoreSnapshot {
            origin: guard.origin(),
            ticks: guard.ticks(),
            capacity: guard.capacity(),
            channels: Channel::ALL
                .iter()
                .map(|channel| (*channel, guard.snapshot(*channel)))
                .collect(),
        }
    }

    pub fn reset(&self) {
        self.write().reset();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, WindowedSampleStore> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, WindowedSampleStore> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
