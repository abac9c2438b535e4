//! Observation primitives backing queues, resources and states.
//!
//! - [`MetricTimeline`]: a piecewise-constant level over virtual time
//!   (queue length, claimed quantity, occupancy) with duration-weighted
//!   statistics.
//! - [`CategoryTimeline`]: the same for non-numeric values; reports how
//!   long each value was held.
//! - [`NumericStatistics`]: streaming sample statistics (length of stay).

use serde::Serialize;

use crate::id::SimTime;

// ---------------------------------------------------------------------------
// MetricTimeline
// ---------------------------------------------------------------------------

/// Duration-weighted summary of a [`MetricTimeline`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Observed span of virtual time.
    pub duration: SimTime,
}

/// A numeric level that changes at discrete instants.
///
/// The value recorded at `t` holds until the next recorded change. Several
/// changes at the same instant collapse into the last one.
#[derive(Debug, Clone, Serialize)]
pub struct MetricTimeline {
    times: Vec<SimTime>,
    values: Vec<f64>,
    enabled: bool,
}

impl MetricTimeline {
    pub fn new(start: SimTime, initial: f64) -> Self {
        Self {
            times: vec![start],
            values: vec![initial],
            enabled: true,
        }
    }

    /// A timeline that only tracks the current value.
    pub fn disabled(start: SimTime, initial: f64) -> Self {
        Self {
            enabled: false,
            ..Self::new(start, initial)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a new level at `now`.
    pub fn add_value(&mut self, now: SimTime, value: f64) {
        if !self.enabled {
            self.values[0] = value;
            self.times[0] = now;
            return;
        }
        match self.times.last() {
            Some(&last) if last == now => {
                if let Some(v) = self.values.last_mut() {
                    *v = value;
                }
            }
            _ => {
                self.times.push(now);
                self.values.push(value);
            }
        }
    }

    /// The most recently recorded level.
    pub fn value(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Level in effect at time `t`.
    pub fn value_at(&self, t: SimTime) -> f64 {
        let idx = self.times.partition_point(|&x| x <= t);
        if idx == 0 {
            self.values[0]
        } else {
            self.values[idx - 1]
        }
    }

    /// `(time, value)` change points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = (SimTime, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Duration-weighted statistics from the first record up to `now`.
    ///
    /// With zero elapsed time the mean is the current value.
    pub fn statistics(&self, now: SimTime) -> TimelineStatistics {
        let start = self.times[0];
        let mut weighted = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for i in 0..self.times.len() {
            let from = self.times[i];
            let to = self.times.get(i + 1).copied().unwrap_or(now).min(now);
            let value = self.values[i];
            min = min.min(value);
            max = max.max(value);
            if to > from {
                weighted += value * (to - from);
            }
        }

        let duration = (now - start).max(0.0);
        let mean = if duration > 0.0 {
            weighted / duration
        } else {
            self.value()
        };
        TimelineStatistics {
            mean,
            min,
            max,
            duration,
        }
    }
}

// ---------------------------------------------------------------------------
// CategoryTimeline
// ---------------------------------------------------------------------------

/// Tracks how long each distinct (rendered) value was held.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTimeline {
    changes: Vec<(SimTime, String)>,
}

impl CategoryTimeline {
    pub fn new(start: SimTime, initial: String) -> Self {
        Self {
            changes: vec![(start, initial)],
        }
    }

    pub fn add_value(&mut self, now: SimTime, value: String) {
        match self.changes.last_mut() {
            Some((t, v)) if *t == now => *v = value,
            _ => self.changes.push((now, value)),
        }
    }

    pub fn changes(&self) -> &[(SimTime, String)] {
        &self.changes
    }

    /// Total time spent in each value up to `now`, in first-seen order.
    pub fn durations(&self, now: SimTime) -> Vec<(String, SimTime)> {
        let mut totals: Vec<(String, SimTime)> = Vec::new();
        for (i, (from, value)) in self.changes.iter().enumerate() {
            let to = self
                .changes
                .get(i + 1)
                .map(|(t, _)| *t)
                .unwrap_or(now)
                .min(now);
            let span = (to - from).max(0.0);
            match totals.iter_mut().find(|(v, _)| v == value) {
                Some((_, total)) => *total += span,
                None => totals.push((value.clone(), span)),
            }
        }
        totals
    }
}

// ---------------------------------------------------------------------------
// NumericStatistics
// ---------------------------------------------------------------------------

/// Serializable summary of a [`NumericStatistics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Streaming sample statistics (Welford's algorithm).
#[derive(Debug, Clone, Default, Serialize)]
pub struct NumericStatistics {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl NumericStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: f64) {
        if self.count == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation; zero with fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary {
            count: self.count,
            mean: self.mean,
            std_dev: self.std_dev(),
            min: self.min,
            max: self.max,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_weighted_mean() {
        let mut tl = MetricTimeline::new(0.0, 0.0);
        tl.add_value(2.0, 4.0);
        tl.add_value(6.0, 1.0);
        // 0 for 2, 4 for 4, 1 for 4 => 20 / 10
        let stats = tl.statistics(10.0);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.duration, 10.0);
    }

    #[test]
    fn timeline_same_instant_collapses() {
        let mut tl = MetricTimeline::new(0.0, 0.0);
        tl.add_value(1.0, 3.0);
        tl.add_value(1.0, 5.0);
        assert_eq!(tl.points().count(), 2);
        assert_eq!(tl.value(), 5.0);
        assert_eq!(tl.value_at(0.5), 0.0);
        assert_eq!(tl.value_at(1.0), 5.0);
    }

    #[test]
    fn timeline_zero_duration_mean_is_current() {
        let mut tl = MetricTimeline::new(3.0, 1.0);
        tl.add_value(3.0, 7.0);
        assert_eq!(tl.statistics(3.0).mean, 7.0);
    }

    #[test]
    fn disabled_timeline_keeps_only_current() {
        let mut tl = MetricTimeline::disabled(0.0, 0.0);
        tl.add_value(1.0, 2.0);
        tl.add_value(2.0, 3.0);
        assert_eq!(tl.points().count(), 1);
        assert_eq!(tl.value(), 3.0);
    }

    #[test]
    fn category_durations() {
        let mut tl = CategoryTimeline::new(0.0, "red".into());
        tl.add_value(3.0, "green".into());
        tl.add_value(5.0, "red".into());
        let durations = tl.durations(10.0);
        assert_eq!(
            durations,
            vec![("red".to_string(), 8.0), ("green".to_string(), 2.0)]
        );
    }

    #[test]
    fn numeric_statistics() {
        let mut stats = NumericStatistics::new();
        assert_eq!(stats.mean(), None);
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.add(x);
        }
        let summary = stats.summary();
        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert!((summary.std_dev - 2.138_089_935).abs() < 1e-6);
    }
}
