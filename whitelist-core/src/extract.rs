//! Login event extraction from raw mail log lines
//!
//! The log format is an external, fragile text format (syslog lines from
//! dovecot and postfix). The grammar here is deliberately tolerant: any
//! line that does not match is skipped, never fatal.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use ipnet::Ipv6Net;
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;

/// Mail delivery protocol a login attempt arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Dovecot imap-login
    Imap,
    /// Postfix submission / SMTP auth
    Submission,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Imap => write!(f, "imap"),
            Protocol::Submission => write!(f, "submission"),
        }
    }
}

/// Normalized outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// One structured login attempt derived from a single log line
///
/// Ephemeral: events are re-derived on every run and never persisted
/// verbatim.
#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub timestamp: DateTime<Utc>,
    /// Normalized source address: IPv4 literal, or the /64 network for IPv6
    pub source_ip: String,
    pub username: String,
    pub protocol: Protocol,
    pub outcome: Outcome,
}

/// Diagnostic tally of an extraction pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_seen: u64,
    pub events: u64,
    pub skipped: u64,
}

/// Parses raw log lines into [`LoginEvent`]s
pub struct EventExtractor {
    timestamp_re: Regex,
    imap_user_re: Regex,
    imap_ip_re: Regex,
    imap_failed_re: Regex,
    smtpd_re: Regex,
    sasl_user_re: Regex,
    client_ip_re: Regex,
}

impl EventExtractor {
    pub fn new() -> Self {
        // Syslog timestamp format: "Mar 25 14:27:47"
        let timestamp_re = Regex::new(r"^(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})").unwrap();

        // Dovecot: "imap-login: Login: user=<alice>, method=PLAIN, rip=203.0.113.7, ..."
        let imap_user_re = Regex::new(r"user=<([^>]+)>").unwrap();
        let imap_ip_re = Regex::new(r"rip=([0-9A-Fa-f:.]+)").unwrap();
        let imap_failed_re = Regex::new(r"(?i)auth failed|aborted login").unwrap();

        // Postfix: "postfix/submission/smtpd[4242]: ...: client=host[203.0.113.7],
        // sasl_method=PLAIN, sasl_username=alice"
        let smtpd_re = Regex::new(r"postfix(?:/submission)?/smtpd").unwrap();
        let sasl_user_re = Regex::new(r"sasl_username=([^,\s]+)").unwrap();
        let client_ip_re = Regex::new(r"client=[^\s\[]*\[([^\]]+)\]").unwrap();

        Self {
            timestamp_re,
            imap_user_re,
            imap_ip_re,
            imap_failed_re,
            smtpd_re,
            sasl_user_re,
            client_ip_re,
        }
    }

    /// Parse a single raw log line
    ///
    /// Returns `None` for lines that carry no recognizable login attempt:
    /// unrelated daemons, connection bookkeeping, or malformed text.
    pub fn parse_line(&self, line: &str) -> Option<LoginEvent> {
        let timestamp = self.parse_timestamp(line)?;

        if line.contains("imap-login:") {
            return self.parse_imap(line, timestamp);
        }

        if self.smtpd_re.is_match(line) {
            return self.parse_submission(line, timestamp);
        }

        None
    }

    /// Parse a batch of lines, tallying diagnostics
    pub fn parse_lines<I, S>(&self, lines: I) -> (Vec<LoginEvent>, ParseStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut events = Vec::new();
        let mut stats = ParseStats::default();

        for line in lines {
            stats.lines_seen += 1;
            match self.parse_line(line.as_ref()) {
                Some(event) => {
                    stats.events += 1;
                    events.push(event);
                }
                None => stats.skipped += 1,
            }
        }

        (events, stats)
    }

    fn parse_imap(&self, line: &str, timestamp: DateTime<Utc>) -> Option<LoginEvent> {
        let outcome = if line.contains("imap-login: Login:") {
            Outcome::Success
        } else if self.imap_failed_re.is_match(line) {
            Outcome::Failure
        } else {
            // Connection bookkeeping ("Connect from", "Disconnected (no auth
            // attempts)" without a user) is not a login attempt
            return None;
        };

        let username = self.imap_user_re.captures(line)?.get(1)?.as_str().to_string();
        let ip_str = self.imap_ip_re.captures(line)?.get(1)?.as_str();
        let source_ip = normalize_source_ip(IpAddr::from_str(ip_str).ok()?);

        Some(LoginEvent {
            timestamp,
            source_ip,
            username,
            protocol: Protocol::Imap,
            outcome,
        })
    }

    fn parse_submission(&self, line: &str, timestamp: DateTime<Utc>) -> Option<LoginEvent> {
        let outcome = if line.contains("authentication failed") {
            Outcome::Failure
        } else {
            Outcome::Success
        };

        // Failed SASL attempts usually carry no sasl_username; those lines
        // fall out here and are skipped
        let username = self.sasl_user_re.captures(line)?.get(1)?.as_str().to_string();
        let ip_str = self.client_ip_re.captures(line)?.get(1)?.as_str();
        let source_ip = normalize_source_ip(IpAddr::from_str(ip_str).ok()?);

        Some(LoginEvent {
            timestamp,
            source_ip,
            username,
            protocol: Protocol::Submission,
            outcome,
        })
    }

    /// Parse a syslog timestamp, assuming the current year
    fn parse_timestamp(&self, line: &str) -> Option<DateTime<Utc>> {
        let caps = self.timestamp_re.captures(line)?;
        let ts_str = caps.get(1)?.as_str();
        let year = Utc::now().year();
        let full_ts = format!("{} {}", year, ts_str);

        NaiveDateTime::parse_from_str(&full_ts, "%Y %b %d %H:%M:%S")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a source address for use as a store key
///
/// IPv4 addresses are kept verbatim. IPv6 addresses are collapsed to their
/// /64 network, since providers rotate interface identifiers within a /64
/// and per-address counting would fragment the evidence.
pub fn normalize_source_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match Ipv6Net::new(v6, 64) {
            Ok(net) => net.trunc().to_string(),
            Err(_) => v6.to_string(),
        },
    }
}
