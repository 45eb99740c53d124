// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Normalized readings produced by the aggregate parser.
//!
//! These are never persisted. A sync pass parses them from the provider
//! response and folds them into daily records.

use chrono::{DateTime, Duration, Utc};

/// Which Google Fit data type a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    Steps,
    Activity,
    Sleep,
    HeartRate,
}

impl ReadingKind {
    /// Google Fit `dataTypeName` for the aggregate request.
    pub fn data_type_name(&self) -> &'static str {
        match self {
            ReadingKind::Steps => "com.google.step_count.delta",
            ReadingKind::Activity => "com.google.activity.segment",
            ReadingKind::Sleep => "com.google.sleep.segment",
            ReadingKind::HeartRate => "com.google.heart_rate.bpm",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Steps => "steps",
            ReadingKind::Activity => "activity",
            ReadingKind::Sleep => "sleep",
            ReadingKind::HeartRate => "heart_rate",
        }
    }
}

/// Google Fit activity type, from the small set of codes we label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Unknown,
    Walking,
    Running,
    Biking,
    Still,
    Exercise,
    Driving,
    Gym,
    /// Any code not in the table above
    Other,
}

impl ActivityType {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ActivityType::Unknown,
            1 => ActivityType::Walking,
            2 => ActivityType::Running,
            3 => ActivityType::Biking,
            4 => ActivityType::Still,
            5 => ActivityType::Exercise,
            7 => ActivityType::Driving,
            8 => ActivityType::Gym,
            _ => ActivityType::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityType::Unknown => "unknown",
            ActivityType::Walking => "walking",
            ActivityType::Running => "running",
            ActivityType::Biking => "biking",
            ActivityType::Still => "still",
            ActivityType::Exercise => "exercise",
            ActivityType::Driving => "driving",
            ActivityType::Gym => "gym",
            ActivityType::Other => "other",
        }
    }
}

/// Sleep stage classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SleepStage {
    Light,
    Deep,
    Rem,
    Awake,
    Unknown,
}

impl SleepStage {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SleepStage::Light,
            2 => SleepStage::Deep,
            3 => SleepStage::Rem,
            4 => SleepStage::Awake,
            _ => SleepStage::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SleepStage::Light => "light",
            SleepStage::Deep => "deep",
            SleepStage::Rem => "rem",
            SleepStage::Awake => "awake",
            SleepStage::Unknown => "unknown",
        }
    }
}

/// Step total for one bucket. Empty buckets report zero steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReading {
    pub bucket_start: Option<DateTime<Utc>>,
    pub bucket_end: Option<DateTime<Utc>>,
    pub steps: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySegment {
    pub activity: ActivityType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActivitySegment {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SleepSegment {
    pub stage: SleepStage,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SleepSegment {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateSample {
    pub bpm: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Any one reading. Parsers for a single kind return the concrete type;
/// this wraps them for callers that handle kinds generically.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Steps(StepReading),
    Activity(ActivitySegment),
    Sleep(SleepSegment),
    HeartRate(HeartRateSample),
}
