//! Points-to-level mapping for the barista career ladder.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub title: &'static str,
    pub min: u64,
    pub max: u64,
}

/// Ordered, contiguous tiers covering `0..=1000`. The last one is the max tier.
#[rustfmt::skip]
pub const TIERS: [Tier; 10] = [
    Tier { title: "Trainee Barista", min: 0, max: 10 },
    Tier { title: "Junior Barista", min: 11, max: 60 },
    Tier { title: "Barista", min: 61, max: 149 },
    Tier { title: "Senior Barista", min: 150, max: 220 },
    Tier { title: "Lead Barista", min: 221, max: 310 },
    Tier { title: "Head Barista", min: 311, max: 420 },
    Tier { title: "Barista Manager", min: 421, max: 550 },
    Tier { title: "Coffee Quality Manager", min: 551, max: 680 },
    Tier { title: "Head of Coffee", min: 681, max: 750 },
    Tier { title: "Master Barista", min: 751, max: 1000 },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level {
    pub title: &'static str,
    pub progress_percent: u8,
    pub points_to_next: u64,
    pub is_max_tier: bool,
}

/// Map a cumulative score to its tier.
///
/// Scores above the table clamp to the top tier. The top tier always reports
/// 100% progress and nothing left to earn.
#[must_use]
pub fn level_for(points: u64) -> Level {
    let top = TIERS.len() - 1;
    let index = TIERS
        .iter()
        .position(|t| (t.min..=t.max).contains(&points))
        .unwrap_or(top);
    let tier = TIERS[index];

    if index == top {
        return Level {
            title: tier.title,
            progress_percent: 100,
            points_to_next: 0,
            is_max_tier: true,
        };
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let progress =
        (100.0 * (points - tier.min) as f64 / (tier.max - tier.min) as f64).round() as u8;

    Level {
        title: tier.title,
        progress_percent: progress,
        points_to_next: tier.max - points + 1,
        is_max_tier: false,
    }
}
