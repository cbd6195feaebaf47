use std::fmt;

use serde::{Deserialize, Serialize};

/// What a single trip is believed to be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// Not due yet, or only just due
    Scheduled,
    /// Standing at its first stop
    Waiting,
    Departed,
    Arrived,
    /// Due and unseen, but could still be running
    Missing,
    /// Never seen and past its scheduled end
    Missed,
    /// Named by a service alert
    Cancelled,
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            TripStatus::Scheduled => "⏳",
            TripStatus::Waiting => "🚏",
            TripStatus::Departed => "🚍",
            TripStatus::Arrived => "✅",
            TripStatus::Missing => "❓",
            TripStatus::Missed => "❌",
            TripStatus::Cancelled => "🚫",
        };
        f.pad(symbol)
    }
}

/// What the trips before this one in its block say about the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    Scheduled,
    BlockInService,
    BlockMissed,
    BlockLikelyCancelled,
    /// The trip has no block
    IgnoreBlock,
}

impl BlockStatus {
    /// The block status once a trip with `status` has been evaluated
    pub fn after(self, status: TripStatus) -> BlockStatus {
        match status {
            TripStatus::Departed | TripStatus::Arrived => BlockStatus::BlockInService,
            TripStatus::Missed | TripStatus::Missing => BlockStatus::BlockMissed,
            TripStatus::Scheduled | TripStatus::Waiting | TripStatus::Cancelled => self,
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BlockStatus::Scheduled => "Block ⏳",
            BlockStatus::BlockInService => "Block ✅",
            BlockStatus::BlockMissed => "Block ⚠️",
            BlockStatus::BlockLikelyCancelled => "Block 🚫",
            BlockStatus::IgnoreBlock => "No block",
        };
        f.pad(symbol)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_propagation() {
        use BlockStatus::*;

        let all_blocks = [
            Scheduled,
            BlockInService,
            BlockMissed,
            BlockLikelyCancelled,
            IgnoreBlock,
        ];
        for before in all_blocks {
            assert_eq!(before.after(TripStatus::Departed), BlockInService);
            assert_eq!(before.after(TripStatus::Arrived), BlockInService);
            assert_eq!(before.after(TripStatus::Missed), BlockMissed);
            assert_eq!(before.after(TripStatus::Missing), BlockMissed);
            assert_eq!(before.after(TripStatus::Scheduled), before);
            assert_eq!(before.after(TripStatus::Waiting), before);
            assert_eq!(before.after(TripStatus::Cancelled), before);
        }
    }

    #[test]
    fn test_serialize() {
        assert_eq!(
            serde_json::to_string(&BlockStatus::BlockInService).unwrap(),
            "\"BLOCK_IN_SERVICE\""
        );
        assert_eq!(
            serde_json::to_string(&TripStatus::Missing).unwrap(),
            "\"MISSING\""
        );
        assert_eq!(format!("{}", TripStatus::Departed), "🚍");
    }
}
