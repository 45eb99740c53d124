// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Flattens `dataset:aggregate` responses into typed readings.
//!
//! One parse function per kind. None of them fail: an absent response or an
//! empty bucket list yields an empty result. Empty datasets contribute a
//! zero reading for step counts (one entry per bucket) and nothing for
//! segment and sample queries. Points with unusable timestamps are logged
//! and skipped.

use crate::models::{
    ActivitySegment, ActivityType, HeartRateSample, Reading, ReadingKind, SleepSegment,
    SleepStage, StepReading,
};
use crate::services::google_fit::{AggregateResponse, DataPoint};
use crate::time_utils::nanos_to_instant;
use chrono::{DateTime, Utc};

/// Parse any kind into the generic reading enum.
pub fn parse(kind: ReadingKind, response: Option<&AggregateResponse>) -> Vec<Reading> {
    match kind {
        ReadingKind::Steps => parse_step_counts(response)
            .into_iter()
            .map(Reading::Steps)
            .collect(),
        ReadingKind::Activity => parse_activity_segments(response)
            .into_iter()
            .map(Reading::Activity)
            .collect(),
        ReadingKind::Sleep => parse_sleep_segments(response)
            .into_iter()
            .map(Reading::Sleep)
            .collect(),
        ReadingKind::HeartRate => parse_heart_rate(response)
            .into_iter()
            .map(Reading::HeartRate)
            .collect(),
    }
}

/// One step total per bucket.
pub fn parse_step_counts(response: Option<&AggregateResponse>) -> Vec<StepReading> {
    let Some(response) = response else {
        return Vec::new();
    };

    response
        .bucket
        .iter()
        .map(|bucket| {
            let steps = bucket
                .dataset
                .iter()
                .flat_map(|dataset| dataset.point.iter())
                .filter_map(|point| point.value.first().and_then(|v| v.int_val))
                .sum();

            StepReading {
                bucket_start: bucket
                    .start_time_millis
                    .and_then(DateTime::from_timestamp_millis),
                bucket_end: bucket
                    .end_time_millis
                    .and_then(DateTime::from_timestamp_millis),
                steps,
            }
        })
        .collect()
}

pub fn parse_activity_segments(response: Option<&AggregateResponse>) -> Vec<ActivitySegment> {
    points(response)
        .filter_map(|point| {
            let (start, end) = point_span(point, ReadingKind::Activity)?;
            let activity = first_int(point)
                .map(ActivityType::from_code)
                .unwrap_or(ActivityType::Other);
            Some(ActivitySegment {
                activity,
                start,
                end,
            })
        })
        .collect()
}

pub fn parse_sleep_segments(response: Option<&AggregateResponse>) -> Vec<SleepSegment> {
    points(response)
        .filter_map(|point| {
            let (start, end) = point_span(point, ReadingKind::Sleep)?;
            let stage = first_int(point)
                .map(SleepStage::from_code)
                .unwrap_or(SleepStage::Unknown);
            Some(SleepSegment { stage, start, end })
        })
        .collect()
}

/// Heart-rate samples, rounded to whole bpm. Zero is a valid reading.
pub fn parse_heart_rate(response: Option<&AggregateResponse>) -> Vec<HeartRateSample> {
    points(response)
        .filter_map(|point| {
            let (start, end) = point_span(point, ReadingKind::HeartRate)?;
            let Some(raw) = point
                .value
                .first()
                .and_then(|v| v.fp_val.or(v.int_val.map(|i| i as f64)))
            else {
                tracing::warn!(start = %start, "Heart-rate point has no numeric value, skipping");
                return None;
            };
            Some(HeartRateSample {
                bpm: round_bpm(raw),
                start,
                end,
            })
        })
        .collect()
}

/// Round half away from zero, clamp negatives (and NaN) to 0.
fn round_bpm(raw: f64) -> u32 {
    let rounded = raw.round();
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else if rounded >= u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

fn points(response: Option<&AggregateResponse>) -> impl Iterator<Item = &DataPoint> {
    response
        .into_iter()
        .flat_map(|r| r.bucket.iter())
        .flat_map(|bucket| bucket.dataset.iter())
        .flat_map(|dataset| dataset.point.iter())
}

fn first_int(point: &DataPoint) -> Option<i64> {
    point.value.first().and_then(|v| v.int_val)
}

/// Start and end instants of a point, or `None` (logged) if unusable.
fn point_span(point: &DataPoint, kind: ReadingKind) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = point.start_time_nanos.and_then(nanos_to_instant);
    let end = point.end_time_nanos.and_then(nanos_to_instant);

    match (start, end) {
        (Some(start), Some(end)) if end >= start => Some((start, end)),
        (Some(start), Some(end)) => {
            tracing::warn!(
                kind = kind.as_str(),
                start = %start,
                end = %end,
                "Point ends before it starts, skipping"
            );
            None
        }
        _ => {
            tracing::warn!(
                kind = kind.as_str(),
                start_nanos = ?point.start_time_nanos,
                end_nanos = ?point.end_time_nanos,
                "Point has missing or invalid timestamps, skipping"
            );
            None
        }
    }
}
