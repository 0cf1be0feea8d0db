use std::collections::VecDeque;

/// Bounded series of samples for one channel.
///
/// Sample `i` sits at logical time `origin + i`. Once the window holds more
/// than `capacity` samples the owner compacts it by dropping the oldest
/// quarter, which also moves `origin` forward by the same count.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    samples: VecDeque<f64>,
    origin: u64,
    capacity: usize,
}

impl ChannelWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            origin: 0,
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.samples.push_back(value);
    }

    /// How many samples compaction would drop right now, if any.
    pub fn overflow(&self) -> Option<usize> {
        if self.samples.len() > self.capacity {
            Some(compaction_count(self.capacity))
        } else {
            None
        }
    }

    /// Drop the `count` oldest samples and advance the origin by the same amount.
    pub fn compact(&mut self, count: usize) {
        let count = count.min(self.samples.len());
        self.samples.drain(..count);
        self.origin += count as u64;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.origin = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ordered `(logical_time, value)` pairs, oldest first.
    pub fn points(&self) -> Vec<(u64, f64)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, value)| (self.origin + i as u64, *value))
            .collect()
    }
}

/// A quarter of the capacity, never less than one sample.
pub fn compaction_count(capacity: usize) -> usize {
    (capacity / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_overflow_until_capacity_exceeded() {
        let mut window = ChannelWindow::new(8);
        for i in 0..8 {
            window.push(i as f64);
        }
        assert_eq!(window.overflow(), None);

        window.push(8.0);
        assert_eq!(window.overflow(), Some(2));
    }

    #[test]
    fn compact_drops_oldest_and_moves_origin() {
        let mut window = ChannelWindow::new(8);
        for i in 0..9 {
            window.push(i as f64 * 10.0);
        }
        window.compact(2);

        assert_eq!(window.origin(), 2);
        assert_eq!(window.len(), 7);
        let points = window.points();
        assert_eq!(points.first(), Some(&(2, 20.0)));
        assert_eq!(points.last(), Some(&(8, 80.0)));
    }

    #[test]
    fn tiny_capacity_still_compacts() {
        assert_eq!(compaction_count(1), 1);
        assert_eq!(compaction_count(3), 1);
        assert_eq!(compaction_count(100), 25);
        assert_eq!(ChannelWindow::new(0).capacity(), 1);
    }

    #[test]
    fn clear_resets_origin() {
        let mut window = ChannelWindow::new(4);
        for i in 0..5 {
            window.push(i as f64);
        }
        window.compact(1);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.origin(), 0);
        assert!(window.points().is_empty());
    }
}
