//! Whitelist classification policy
//!
//! A pure pass over the persisted counts: nothing here touches the store.

use crate::store::IpUserCount;
use std::collections::BTreeMap;

/// Minimum distinct users for a hard whitelist entry
const HARD_MIN_USERS: usize = 3;
/// Minimum successes for a single-user (individual) entry
const INDIVIDUAL_MIN_LOGINS: u64 = 3;

/// Acceptance tier, ordered by distinct-user evidence strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Three or more distinct users logged in from this address
    Hard,
    /// Exactly two distinct users
    Soft,
    /// One user with a solid login history
    Individual,
    /// Not enough evidence; reported for visibility only
    Rejected,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Rejected)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Hard => write!(f, "hard"),
            Verdict::Soft => write!(f, "soft"),
            Verdict::Individual => write!(f, "individual"),
            Verdict::Rejected => write!(f, "rejected"),
        }
    }
}

/// Per-IP classification result, derived fresh each run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistDecision {
    pub source_ip: String,
    pub distinct_user_count: usize,
    pub total_success_count: u64,
    /// Per-user success counts, for the report's justification line
    pub users: Vec<(String, u64)>,
    pub verdict: Verdict,
    pub reason: String,
}

/// Classify every IP present in the store
///
/// First match wins: hard (>= 3 distinct users), soft (exactly 2),
/// individual (1 user with >= 3 successes), rejected otherwise.
/// Output is sorted by IP for deterministic reports.
pub fn classify(counts: &[IpUserCount]) -> Vec<WhitelistDecision> {
    let mut by_ip: BTreeMap<&str, Vec<(&str, u64)>> = BTreeMap::new();
    for count in counts {
        by_ip
            .entry(count.source_ip.as_str())
            .or_default()
            .push((count.username.as_str(), count.success_count));
    }

    by_ip
        .into_iter()
        .map(|(ip, mut users)| {
            users.sort();
            let distinct_user_count = users.len();
            let total_success_count: u64 = users.iter().map(|(_, c)| *c).sum();

            let (verdict, reason) = if distinct_user_count >= HARD_MIN_USERS {
                (
                    Verdict::Hard,
                    format!("{} distinct users", distinct_user_count),
                )
            } else if distinct_user_count == 2 {
                (Verdict::Soft, "2 distinct users".to_string())
            } else if total_success_count >= INDIVIDUAL_MIN_LOGINS {
                (
                    Verdict::Individual,
                    format!("1 user, {} logins", total_success_count),
                )
            } else {
                (
                    Verdict::Rejected,
                    format!(
                        "1 user, {}/{} logins needed",
                        total_success_count, INDIVIDUAL_MIN_LOGINS
                    ),
                )
            };

            WhitelistDecision {
                source_ip: ip.to_string(),
                distinct_user_count,
                total_success_count,
                users: users
                    .into_iter()
                    .map(|(u, c)| (u.to_string(), c))
                    .collect(),
                verdict,
                reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn count(ip: &str, user: &str, successes: u64) -> IpUserCount {
        IpUserCount {
            source_ip: ip.to_string(),
            username: user.to_string(),
            success_count: successes,
            last_seen: Utc.with_ymd_and_hms(2026, 3, 25, 14, 27, 47).unwrap(),
        }
    }

    #[test]
    fn test_three_distinct_users_is_hard() {
        let counts = vec![
            count("10.0.0.5", "alice", 1),
            count("10.0.0.5", "bob", 1),
            count("10.0.0.5", "carol", 1),
        ];
        let decisions = classify(&counts);

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].verdict, Verdict::Hard);
        assert_eq!(decisions[0].distinct_user_count, 3);
        assert_eq!(decisions[0].total_success_count, 3);
        assert_eq!(decisions[0].reason, "3 distinct users");
    }

    #[test]
    fn test_two_distinct_users_is_soft_regardless_of_counts() {
        let counts = vec![count("10.0.0.6", "dave", 1), count("10.0.0.6", "erin", 1)];
        let decisions = classify(&counts);
        assert_eq!(decisions[0].verdict, Verdict::Soft);

        // Counts do not matter, only the user set does
        let counts = vec![
            count("10.0.0.6", "dave", 50),
            count("10.0.0.6", "erin", 1),
        ];
        let decisions = classify(&counts);
        assert_eq!(decisions[0].verdict, Verdict::Soft);
        assert_eq!(decisions[0].reason, "2 distinct users");
    }

    #[test]
    fn test_single_user_with_enough_logins_is_individual() {
        let counts = vec![count("10.0.0.7", "frank", 5)];
        let decisions = classify(&counts);

        assert_eq!(decisions[0].verdict, Verdict::Individual);
        assert_eq!(decisions[0].reason, "1 user, 5 logins");
        assert!(decisions[0].verdict.is_accepted());
    }

    #[test]
    fn test_single_user_below_threshold_is_rejected() {
        let counts = vec![count("10.0.0.8", "grace", 2)];
        let decisions = classify(&counts);

        assert_eq!(decisions[0].verdict, Verdict::Rejected);
        assert_eq!(decisions[0].reason, "1 user, 2/3 logins needed");
        assert!(!decisions[0].verdict.is_accepted());
    }

    #[test]
    fn test_threshold_boundary() {
        let decisions = classify(&[count("192.0.2.1", "heidi", 3)]);
        assert_eq!(decisions[0].verdict, Verdict::Individual);

        let decisions = classify(&[count("192.0.2.1", "heidi", 2)]);
        assert_eq!(decisions[0].verdict, Verdict::Rejected);
    }

    #[test]
    fn test_decisions_sorted_by_ip() {
        let counts = vec![
            count("192.0.2.9", "x", 1),
            count("10.0.0.5", "a", 1),
            count("172.16.0.1", "m", 1),
        ];
        let ips: Vec<String> = classify(&counts)
            .into_iter()
            .map(|d| d.source_ip)
            .collect();

        assert_eq!(ips, vec!["10.0.0.5", "172.16.0.1", "192.0.2.9"]);
    }

    #[test]
    fn test_per_user_breakdown_is_kept() {
        let counts = vec![
            count("10.0.0.5", "bob", 2),
            count("10.0.0.5", "alice", 4),
        ];
        let decisions = classify(&counts);

        assert_eq!(
            decisions[0].users,
            vec![("alice".to_string(), 4), ("bob".to_string(), 2)]
        );
        assert_eq!(decisions[0].total_success_count, 6);
    }

    #[test]
    fn test_empty_store_classifies_to_nothing() {
        assert!(classify(&[]).is_empty());
    }
}
