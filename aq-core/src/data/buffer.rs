//! Bounded sample buffer
//!
//! Single writer (the acquisition worker), any number of readers. The lock is
//! held only for append-and-trim or for copying data out.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::data::types::Sample;

/// Shared, bounded, oldest-first sample history
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    inner: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create an empty buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest entries past capacity
    ///
    /// A timestamp older than the newest entry is raised to it so the buffer
    /// stays non-decreasing.
    pub fn push(&self, mut sample: Sample) {
        let mut samples = self.inner.lock();
        if let Some(last) = samples.back() {
            if sample.timestamp < last.timestamp {
                trace!(
                    "Clamping out-of-order timestamp {} to {}",
                    sample.timestamp,
                    last.timestamp
                );
                sample.timestamp = last.timestamp;
            }
        }
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Copy of every sample, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Copy of the newest `n` samples, oldest first
    pub fn tail(&self, n: usize) -> Vec<Sample> {
        let samples = self.inner.lock();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Newest sample, if any
    pub fn latest(&self) -> Option<Sample> {
        self.inner.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(crate::constants::acquisition::DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sample(co2: u16, timestamp: f64) -> Sample {
        Sample {
            temperature: 22.0,
            humidity: None,
            sound_db: None,
            co2,
            voc: None,
            timestamp,
        }
    }

    #[test]
    fn test_never_exceeds_capacity_and_evicts_oldest() {
        let buffer = SampleBuffer::new(5);
        for i in 0..50u16 {
            buffer.push(sample(400 + i, f64::from(i)));
            assert!(buffer.len() <= 5);
        }
        let co2: Vec<u16> = buffer.snapshot().iter().map(|s| s.co2).collect();
        assert_eq!(co2, vec![445, 446, 447, 448, 449]);
    }

    #[test]
    fn test_tail_and_latest() {
        let buffer = SampleBuffer::new(10);
        assert!(buffer.latest().is_none());
        for i in 0..4u16 {
            buffer.push(sample(400 + i, f64::from(i)));
        }
        let tail: Vec<u16> = buffer.tail(2).iter().map(|s| s.co2).collect();
        assert_eq!(tail, vec![402, 403]);
        assert_eq!(buffer.tail(100).len(), 4);
        assert_eq!(buffer.latest().unwrap().co2, 403);
    }

    #[test]
    fn test_timestamps_stay_non_decreasing() {
        let buffer = SampleBuffer::new(10);
        buffer.push(sample(400, 10.0));
        buffer.push(sample(401, 9.0));
        buffer.push(sample(402, 11.0));
        let ts: Vec<f64> = buffer.snapshot().iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![10.0, 10.0, 11.0]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let buffer = SampleBuffer::new(0);
        buffer.push(sample(400, 0.0));
        buffer.push(sample(401, 1.0));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_whole_samples() {
        let buffer = SampleBuffer::new(100);
        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..1000u16 {
                    buffer.push(sample(i, f64::from(i)));
                }
            })
        };
        let reader = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = buffer.snapshot();
                    assert!(snap.len() <= 100);
                    assert!(snap.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.latest().unwrap().co2, 999);
    }
}
