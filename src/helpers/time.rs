use chrono::Utc;

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

/// Seconds until `expiry_unix_ts`, never negative.
pub fn remaining_seconds(expiry_unix_ts: i64) -> i64 {
    (expiry_unix_ts - now_i64()).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_seconds_is_clamped() {
        assert_eq!(remaining_seconds(0), 0);
        let remaining = remaining_seconds(now_i64() + 100);
        assert!(remaining > 95 && remaining <= 100);
    }
}
