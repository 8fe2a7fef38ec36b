use crate::models::Zone;

pub const RED_CEILING: f64 = 45.0;
pub const YELLOW_CEILING: f64 = 75.0;

/// 45 and below is Red, up to and including 75 is Yellow, above is Green.
pub fn classify_zone(total_score: f64) -> Zone {
    if total_score <= RED_CEILING {
        Zone::Red
    } else if total_score <= YELLOW_CEILING {
        Zone::Yellow
    } else {
        Zone::Green
    }
}
