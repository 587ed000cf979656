//! Sample window with time-based expiration
//!
//! The window stores recently ingested samples and hands them out one period
//! at a time. Samples older than the evaluation span are pruned, and a
//! capacity limit bounds memory when a device reports unusually fast.
//!
//! Samples are bucketed by the time ingest received them. A sample stamped
//! before the last closed boundary belongs to the open period.

use crate::events::{Sample, Timestamp};
use chrono::Duration;
use log::{debug, warn};
use std::collections::VecDeque;

/// Rolling buffer of samples owned by the evaluation path
///
/// Writers (ingest) only ever call [`SampleWindow::add_sample`]; the tick
/// path calls [`SampleWindow::close_period`] once per evaluation tick.
#[derive(Debug)]
pub struct SampleWindow {
    /// Buffered samples, roughly in arrival order
    samples: VecDeque<Sample>,
    /// Length of one evaluation period
    period: Duration,
    /// Samples older than this (relative to the last boundary) are dropped
    max_age: Duration,
    /// Maximum number of buffered samples
    max_size: usize,
    /// End of the most recently closed period
    boundary: Option<Timestamp>,
}

impl SampleWindow {
    /// Create a new window
    ///
    /// # Arguments
    ///
    /// * `period` - Length of one evaluation period
    /// * `max_age` - Span of all retained periods (`period * evaluation_periods`)
    /// * `max_size` - Maximum number of samples to buffer
    ///
    /// # Examples
    ///
    /// ```
    /// use byra::aggregator::SampleWindow;
    /// use chrono::Duration;
    ///
    /// let window = SampleWindow::new(Duration::minutes(5), Duration::minutes(15), 10_000);
    /// assert!(window.is_empty());
    /// ```
    pub fn new(period: Duration, max_age: Duration, max_size: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            period,
            max_age,
            max_size,
            boundary: None,
        }
    }

    /// Add a sample, evicting the oldest one if the buffer is full
    ///
    /// A sample stamped before the last closed boundary is restamped to that
    /// boundary so it lands in the open period.
    pub fn add_sample(&mut self, sample: Sample) {
        let sample = match self.boundary {
            Some(boundary) if sample.timestamp < boundary => {
                debug!(
                    "Sample stamped {} arrived after the period closed at {}, counting it in the open period",
                    sample.timestamp, boundary
                );
                Sample::new(sample.value, boundary)
            }
            _ => sample,
        };

        self.samples.push_back(sample);
        while self.samples.len() > self.max_size {
            if let Some(dropped) = self.samples.pop_front() {
                debug!(
                    "Sample window full, dropping sample from {}",
                    dropped.timestamp
                );
            }
        }
    }

    /// Close the period ending at `end` and return its sample values
    ///
    /// The period starts at the previous boundary, or `end - period` on the
    /// first call. Samples stamped at or after `end` stay buffered for the
    /// next period. Expired samples are pruned afterwards.
    ///
    /// An `end` at or before the previous boundary (the clock stepped back)
    /// yields an empty period and leaves the boundary where it was.
    pub fn close_period(&mut self, end: Timestamp) -> Vec<f64> {
        let start = match self.boundary {
            Some(previous) if end <= previous => {
                warn!(
                    "Period end {} is not after the previous boundary {}, treating the period as empty",
                    end, previous
                );
                return Vec::new();
            }
            Some(previous) => previous,
            None => end - self.period,
        };

        let values: Vec<f64> = self
            .samples
            .iter()
            .filter(|sample| sample.timestamp >= start && sample.timestamp < end)
            .map(|sample| sample.value)
            .collect();

        debug!(
            "Closed period [{}, {}) with {} samples",
            start,
            end,
            values.len()
        );

        self.boundary = Some(end);
        self.prune_old_entries(end);
        values
    }

    /// Drop samples that fall before the retained span ending at `now`
    pub fn prune_old_entries(&mut self, now: Timestamp) {
        let cutoff = now - self.max_age;
        self.samples.retain(|sample| sample.timestamp >= cutoff);
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Buffered samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}
