// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod daily;
pub mod fit_parser;
pub mod google_fit;
pub mod kms;
pub mod revocation;
pub mod scheduler;
pub mod sync;
pub mod token;

pub use daily::{DurationStageScore, SleepScorePolicy};
pub use google_fit::GoogleFitClient;
pub use kms::KmsService;
pub use revocation::{RevocationReport, RevocationService};
pub use scheduler::{SchedulerConfig, SchedulerError, SyncScheduler};
pub use sync::{SyncEngine, SyncReport};
pub use token::{TokenManager, TokenState, TokenStatus};
