//! Deadline buckets for the deadline board.
//!
//! Items are grouped by how far their planned finish date lies from today's
//! local midnight. Windows are inclusive on both ends and expressed in unix
//! seconds; an open end is `None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpireType {
    Undefined,
    Expired,
    ExpireIn1Day,
    ExpireIn2Days,
    ExpireIn7Days,
    ExpireIn30Days,
    ExpireInFuture,
}

/// Inclusive finish-time window in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ExpireType {
    pub const ALL: [ExpireType; 7] = [
        ExpireType::Undefined,
        ExpireType::Expired,
        ExpireType::ExpireIn1Day,
        ExpireType::ExpireIn2Days,
        ExpireType::ExpireIn7Days,
        ExpireType::ExpireIn30Days,
        ExpireType::ExpireInFuture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpireType::Undefined => "Undefined",
            ExpireType::Expired => "Expired",
            ExpireType::ExpireIn1Day => "ExpireIn1Day",
            ExpireType::ExpireIn2Days => "ExpireIn2Days",
            ExpireType::ExpireIn7Days => "ExpireIn7Days",
            ExpireType::ExpireIn30Days => "ExpireIn30Days",
            ExpireType::ExpireInFuture => "ExpireInFuture",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExpireType::Undefined => "No deadline",
            ExpireType::Expired => "Expired",
            ExpireType::ExpireIn1Day => "Due today",
            ExpireType::ExpireIn2Days => "Due tomorrow",
            ExpireType::ExpireIn7Days => "Due within 7 days",
            ExpireType::ExpireIn30Days => "Due within 30 days",
            ExpireType::ExpireInFuture => "Later",
        }
    }

    /// Window relative to `midnight` (today 00:00 local, unix seconds).
    /// `Undefined` has no window: it selects items without a finish date.
    pub fn window(&self, midnight: i64) -> Option<DeadlineWindow> {
        let tomorrow = midnight + DAY;
        let two_days = midnight + 2 * DAY;
        let seven_days = midnight + 7 * DAY;
        let thirty_days = midnight + 30 * DAY;
        let (start, end) = match self {
            ExpireType::Undefined => return None,
            ExpireType::Expired => (Some(1), Some(midnight - 1)),
            ExpireType::ExpireIn1Day => (Some(midnight), Some(tomorrow - 1)),
            ExpireType::ExpireIn2Days => (Some(tomorrow), Some(two_days - 1)),
            ExpireType::ExpireIn7Days => (Some(two_days), Some(seven_days - 1)),
            ExpireType::ExpireIn30Days => (Some(seven_days), Some(thirty_days - 1)),
            ExpireType::ExpireInFuture => (Some(thirty_days), None),
        };
        Some(DeadlineWindow { start, end })
    }

    /// Bucket for a finish time, both in unix seconds.
    pub fn classify(finish: Option<i64>, midnight: i64) -> ExpireType {
        let Some(finish) = finish else {
            return ExpireType::Undefined;
        };
        ExpireType::ALL
            .into_iter()
            .skip(1)
            .find(|bucket| {
                bucket
                    .window(midnight)
                    .is_some_and(|w| w.contains(finish))
            })
            .unwrap_or(ExpireType::Expired)
    }
}

impl DeadlineWindow {
    pub fn contains(&self, ts: i64) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

impl fmt::Display for ExpireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpireType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpireType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown deadline bucket '{s}'"))
    }
}
