use std::ops::Index;

use chrono::{DateTime, FixedOffset, TimeDelta, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quantity::rate::KilowattHourRate;

/// Timestamp as produced by the upstream price source, with its own UTC offset.
pub type Timestamp = DateTime<FixedOffset>;

/// Single hourly price sample.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, derive_more::Constructor)]
pub struct Point {
    /// Start of the hour.
    pub time: Timestamp,

    pub price: KilowattHourRate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("the price series is empty")]
    Empty,

    #[error("the price series is not hourly at index {index}: {previous} is followed by {next}")]
    NotContiguous { index: usize, previous: Timestamp, next: Timestamp },

    #[error("non-finite price at {time}")]
    NonFinitePrice { time: Timestamp },
}

/// Immutable, contiguous hourly price series.
#[must_use]
#[derive(Clone, Debug)]
pub struct PriceSeries(Vec<Point>);

impl PriceSeries {
    pub fn try_new(points: Vec<Point>) -> Result<Self, SeriesError> {
        if points.is_empty() {
            return Err(SeriesError::Empty);
        }
        if let Some(point) = points.iter().find(|point| !point.price.is_finite()) {
            return Err(SeriesError::NonFinitePrice { time: point.time });
        }
        if let Some((index, (previous, next))) = points
            .iter()
            .tuple_windows()
            .find_position(|(previous, next)| next.time - previous.time != TimeDelta::hours(1))
        {
            return Err(SeriesError::NotContiguous {
                index: index + 1,
                previous: previous.time,
                next: next.time,
            });
        }
        Ok(Self(points))
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: an empty series cannot be constructed.
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hour of day of the very first sample.
    ///
    /// The disclosure rule counts hours of day from here, so that a series which does not start
    /// at midnight is still handled correctly.
    pub fn first_hour(&self) -> u32 {
        self.0[0].time.hour()
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.0
    }

    /// Get up to `len` samples starting at `start`.
    ///
    /// The returned slice is shorter than requested near the end of the series.
    pub fn slice(&self, start: usize, len: usize) -> &[Point] {
        let start = start.min(self.0.len());
        let end = start.saturating_add(len).min(self.0.len());
        &self.0[start..end]
    }

    /// Position of the sample starting exactly at `time`.
    pub fn position(&self, time: Timestamp) -> Option<usize> {
        self.0.binary_search_by_key(&time, |point| point.time).ok()
    }
}

impl Index<usize> for PriceSeries {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}
