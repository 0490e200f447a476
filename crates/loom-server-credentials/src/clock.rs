// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Mutex;

/// Source of version creation timestamps.
pub trait TimeProvider: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never hands out the same instant twice.
///
/// Timestamps are truncated to microseconds, the precision they are stored at.
/// When the system clock has not advanced past the last timestamp (coarse
/// resolution, or a step backwards) the previous value is bumped by 1µs.
#[derive(Debug, Default)]
pub struct MonotonicClock {
	last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
	pub fn new() -> Self {
		Self::default()
	}
}

impl TimeProvider for MonotonicClock {
	fn now(&self) -> DateTime<Utc> {
		let wall = Utc::now().trunc_subsecs(6);
		let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
		let next = match *last {
			Some(prev) if wall <= prev => prev + Duration::microseconds(1),
			_ => wall,
		};
		*last = Some(next);
		next
	}
}
