use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

/// Two timestamps fall on the same calendar day in UTC.
pub fn same_day_utc(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

pub fn sha256(bytes: &[u8]) -> Sha256Hash {
    Sha256::digest(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_same_day_utc_boundary() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 50).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 5).unwrap();
        let later_same_day = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();

        assert!(!same_day_utc(before, after));
        assert!(same_day_utc(before, later_same_day));
    }
}
