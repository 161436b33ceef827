use chrono::{TimeZone, Utc};

pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

pub fn deadline_display(deadline: u64) -> String {
    match Utc.timestamp_opt(deadline as i64, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => format!("@{}", deadline),
    }
}

pub fn time_remaining(deadline: u64, now: u64) -> String {
    if deadline <= now {
        return "CLOSED".to_string();
    }
    let diff = deadline - now;
    format!("{:02}m {:02}s", diff / 60, diff % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_closed_after_deadline() {
        assert_eq!(time_remaining(100, 100), "CLOSED");
        assert_eq!(time_remaining(100, 200), "CLOSED");
        assert_eq!(time_remaining(190, 100), "01m 30s");
    }

    #[test]
    fn deadline_renders_rfc3339() {
        assert_eq!(deadline_display(0), "1970-01-01T00:00:00+00:00");
    }
}
