// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Folding parsed readings into daily records.
//!
//! Days are UTC calendar dates of each segment/sample start. Durations are
//! summed in milliseconds and floored to whole minutes, so stage minutes
//! never add up to more than the total.

use crate::models::{
    DailyHeartRateRecord, DailySleepRecord, HeartRateSample, RecordSource, SleepSegment,
    SleepStage,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Scoring policy for a night of sleep. Product heuristic, not a contract.
pub trait SleepScorePolicy: Send + Sync {
    fn score(&self, summary: &SleepSummary) -> Option<u32>;
}

/// Per-night minutes handed to a `SleepScorePolicy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepSummary {
    pub total_minutes: u32,
    pub deep_minutes: u32,
    pub rem_minutes: u32,
    pub light_minutes: u32,
    pub awake_minutes: u32,
}

impl SleepSummary {
    /// Stage with the most minutes among deep, REM and light.
    pub fn dominant_stage(&self) -> Option<SleepStage> {
        [
            (SleepStage::Deep, self.deep_minutes),
            (SleepStage::Rem, self.rem_minutes),
            (SleepStage::Light, self.light_minutes),
        ]
        .into_iter()
        .filter(|(_, minutes)| *minutes > 0)
        .max_by_key(|(_, minutes)| *minutes)
        .map(|(stage, _)| stage)
    }
}

/// Duration bands with a small bonus for the dominant stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationStageScore;

impl SleepScorePolicy for DurationStageScore {
    fn score(&self, summary: &SleepSummary) -> Option<u32> {
        if summary.total_minutes == 0 {
            return None;
        }

        let base = match summary.total_minutes {
            480.. => 90,
            420..=479 => 85,
            360..=419 => 75,
            300..=359 => 60,
            _ => 40,
        };
        let bonus = match summary.dominant_stage() {
            Some(SleepStage::Deep) => 5,
            Some(SleepStage::Rem) => 3,
            Some(SleepStage::Light) => 1,
            _ => 0,
        };
        Some((base + bonus).min(100))
    }
}

#[derive(Default)]
struct SleepDay {
    total_ms: i64,
    deep_ms: i64,
    rem_ms: i64,
    light_ms: i64,
    awake_ms: i64,
    first_start: Option<DateTime<Utc>>,
    last_end: Option<DateTime<Utc>>,
}

fn extend_span(
    first: &mut Option<DateTime<Utc>>,
    last: &mut Option<DateTime<Utc>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    *first = Some(first.map_or(start, |f| f.min(start)));
    *last = Some(last.map_or(end, |l| l.max(end)));
}

fn provider_record_id(first: Option<DateTime<Utc>>, last: Option<DateTime<Utc>>) -> Option<String> {
    Some(format!(
        "{}-{}",
        first?.timestamp_millis(),
        last?.timestamp_millis()
    ))
}

fn minutes(ms: i64) -> u32 {
    u32::try_from(ms.max(0) / MILLIS_PER_MINUTE).unwrap_or(u32::MAX)
}

fn percent(part: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        ((part as f64 / total as f64) * 100.0).round() as u32
    }
}

/// Build one provider-sourced sleep record per calendar day.
pub fn daily_sleep_records(
    account_id: u64,
    segments: &[SleepSegment],
    policy: &dyn SleepScorePolicy,
    created_at: &str,
) -> Vec<DailySleepRecord> {
    let mut days: BTreeMap<NaiveDate, SleepDay> = BTreeMap::new();

    for segment in segments {
        let ms = segment.duration().num_milliseconds().max(0);
        let day = days.entry(segment.start.date_naive()).or_default();
        day.total_ms += ms;
        match segment.stage {
            SleepStage::Deep => day.deep_ms += ms,
            SleepStage::Rem => day.rem_ms += ms,
            SleepStage::Light => day.light_ms += ms,
            SleepStage::Awake => day.awake_ms += ms,
            SleepStage::Unknown => {}
        }
        extend_span(
            &mut day.first_start,
            &mut day.last_end,
            segment.start,
            segment.end,
        );
    }

    days.into_iter()
        .map(|(date, day)| {
            let summary = SleepSummary {
                total_minutes: minutes(day.total_ms),
                deep_minutes: minutes(day.deep_ms),
                rem_minutes: minutes(day.rem_ms),
                light_minutes: minutes(day.light_ms),
                awake_minutes: minutes(day.awake_ms),
            };
            let asleep = summary.total_minutes.saturating_sub(summary.awake_minutes);

            DailySleepRecord {
                account_id,
                date,
                total_minutes: summary.total_minutes,
                deep_minutes: summary.deep_minutes,
                rem_minutes: summary.rem_minutes,
                light_minutes: summary.light_minutes,
                awake_minutes: summary.awake_minutes,
                deep_percent: percent(summary.deep_minutes, summary.total_minutes),
                rem_percent: percent(summary.rem_minutes, summary.total_minutes),
                light_percent: percent(summary.light_minutes, summary.total_minutes),
                awake_percent: percent(summary.awake_minutes, summary.total_minutes),
                sleep_efficiency: percent(asleep, summary.total_minutes),
                sleep_score: policy.score(&summary),
                source: RecordSource::Provider,
                provider_record_id: provider_record_id(day.first_start, day.last_end),
                created_at: created_at.to_string(),
            }
        })
        .collect()
}

#[derive(Default)]
struct HeartRateDay {
    sum: u64,
    count: u32,
    min: u32,
    max: u32,
    first_start: Option<DateTime<Utc>>,
    last_end: Option<DateTime<Utc>>,
}

/// Build one provider-sourced heart-rate record per calendar day.
///
/// Every sample counts, including zero-bpm readings. Hours without a
/// measurement produce no sample at all.
pub fn daily_heart_rate_records(
    account_id: u64,
    samples: &[HeartRateSample],
    created_at: &str,
) -> Vec<DailyHeartRateRecord> {
    let mut days: BTreeMap<NaiveDate, HeartRateDay> = BTreeMap::new();

    for sample in samples {
        let day = days.entry(sample.start.date_naive()).or_default();
        if day.count == 0 {
            day.min = sample.bpm;
            day.max = sample.bpm;
        } else {
            day.min = day.min.min(sample.bpm);
            day.max = day.max.max(sample.bpm);
        }
        day.sum += u64::from(sample.bpm);
        day.count += 1;
        extend_span(
            &mut day.first_start,
            &mut day.last_end,
            sample.start,
            sample.end,
        );
    }

    days.into_iter()
        .map(|(date, day)| {
            let mean = (day.sum as f64 / f64::from(day.count)).round() as u32;
            DailyHeartRateRecord {
                account_id,
                date,
                avg_bpm: mean.clamp(day.min, day.max),
                min_bpm: day.min,
                max_bpm: day.max,
                sample_count: day.count,
                source: RecordSource::Provider,
                provider_record_id: provider_record_id(day.first_start, day.last_end),
                created_at: created_at.to_string(),
            }
        })
        .collect()
}
