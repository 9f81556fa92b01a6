// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Noderr Protocol Foundation
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Fixed inter-session boundaries, in UTC minutes of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionBoundary {
    /// 00:00 UTC
    SydneyTokyo,
    /// 08:00 UTC
    TokyoLondon,
    /// 13:00 UTC
    LondonNewYork,
    /// 21:00 UTC
    NewYorkClose,
}

impl SessionBoundary {
    /// All boundaries in chronological order
    pub fn all() -> [SessionBoundary; 4] {
        [
            SessionBoundary::SydneyTokyo,
            SessionBoundary::TokyoLondon,
            SessionBoundary::LondonNewYork,
            SessionBoundary::NewYorkClose,
        ]
    }

    /// Boundary time as minutes past UTC midnight
    pub fn minute_of_day(&self) -> i64 {
        match self {
            SessionBoundary::SydneyTokyo => 0,
            SessionBoundary::TokyoLondon => 8 * 60,
            SessionBoundary::LondonNewYork => 13 * 60,
            SessionBoundary::NewYorkClose => 21 * 60,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionBoundary::SydneyTokyo => "sydney_tokyo",
            SessionBoundary::TokyoLondon => "tokyo_london",
            SessionBoundary::LondonNewYork => "london_new_york",
            SessionBoundary::NewYorkClose => "new_york_close",
        }
    }
}

/// A wall-clock time falling inside a session boundary window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransition {
    pub boundary: SessionBoundary,
    /// Signed minutes relative to the boundary (negative = before)
    pub offset_minutes: i64,
}

/// Whether `now` falls within `window_minutes` of any session boundary.
/// Pure function of UTC wall-clock time; handles the midnight wrap so
/// 23:50 matches the 00:00 boundary.
pub fn session_transition(now: DateTime<Utc>, window_minutes: i64) -> Option<SessionTransition> {
    let minute = now.hour() as i64 * 60 + now.minute() as i64;

    for boundary in SessionBoundary::all() {
        let target = boundary.minute_of_day();
        let mut diff = minute - target;
        if diff > 720 {
            diff -= 1440;
        } else if diff < -720 {
            diff += 1440;
        }
        if diff.abs() <= window_minutes {
            return Some(SessionTransition {
                boundary,
                offset_minutes: diff,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_london_new_york_window() {
        let hit = session_transition(at(13, 5), 15).unwrap();
        assert_eq!(hit.boundary, SessionBoundary::LondonNewYork);
        assert_eq!(hit.offset_minutes, 5);

        let before = session_transition(at(12, 50), 15).unwrap();
        assert_eq!(before.boundary, SessionBoundary::LondonNewYork);
        assert_eq!(before.offset_minutes, -10);
    }

    #[test]
    fn test_outside_any_window() {
        assert!(session_transition(at(10, 30), 15).is_none());
        assert!(session_transition(at(16, 0), 15).is_none());
    }

    #[test]
    fn test_midnight_wrap() {
        let late = session_transition(at(23, 50), 15).unwrap();
        assert_eq!(late.boundary, SessionBoundary::SydneyTokyo);
        assert_eq!(late.offset_minutes, -10);

        let early = session_transition(at(0, 10), 15).unwrap();
        assert_eq!(early.boundary, SessionBoundary::SydneyTokyo);
        assert_eq!(early.offset_minutes, 10);
    }

    #[test]
    fn test_window_edge_inclusive() {
        let edge = session_transition(at(8, 15), 15).unwrap();
        assert_eq!(edge.boundary, SessionBoundary::TokyoLondon);
        assert!(session_transition(at(8, 16), 15).is_none());
    }
}
