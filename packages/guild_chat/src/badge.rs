/// Counts above this render as "300+". Display only; the count stays exact.
pub const BADGE_CAP: u64 = 300;

pub fn badge_label(count: u64) -> String {
    if count > BADGE_CAP {
        format!("{BADGE_CAP}+")
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_three_hundred() {
        assert_eq!(badge_label(305), "300+");
        assert_eq!(badge_label(301), "300+");
        assert_eq!(badge_label(300), "300");
        assert_eq!(badge_label(299), "299");
        assert_eq!(badge_label(0), "0");
    }
}
