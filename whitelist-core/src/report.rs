//! Draft report rendering and atomic writing
//!
//! The report is a non-binding draft: an operator reviews it and copies
//! accepted addresses into fail2ban's own ignoreip configuration. Writing
//! goes through a temp file and a rename, so a concurrent reader (or a
//! config reload racing with us) never sees a half-written draft.

use crate::classify::{Verdict, WhitelistDecision};
use crate::error::{Result, WhitelistError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Maximum addresses per ignoreip continuation line
const IPS_PER_LINE: usize = 10;

/// Render the full draft report
pub fn render(decisions: &[WhitelistDecision]) -> String {
    let mut out = String::new();

    out.push_str("# Draft ignoreip whitelist generated by f2b-whitelist\n");
    out.push_str("# Review and copy accepted addresses into the live ignoreip configuration.\n");

    for (title, verdict) in [
        ("Hard whitelist", Verdict::Hard),
        ("Soft whitelist", Verdict::Soft),
        ("Individuals whitelist", Verdict::Individual),
    ] {
        out.push_str(&format!("\n# {}\n\n", title));
        for decision in decisions.iter().filter(|d| d.verdict == verdict) {
            out.push_str(&render_entry(decision));
        }
    }

    out.push_str("\n# Rejected, not whitelisted\n\n");
    for decision in decisions.iter().filter(|d| d.verdict == Verdict::Rejected) {
        out.push_str(&render_entry(decision));
    }

    out.push_str(&render_ignoreip_block(decisions));
    out
}

fn render_entry(decision: &WhitelistDecision) -> String {
    let users = decision
        .users
        .iter()
        .map(|(user, count)| format!("{}({})", user, count))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "    # {:25} - {} - {}\n",
        decision.source_ip, decision.reason, users
    )
}

/// The ready-to-paste ignoreip_local variable block
fn render_ignoreip_block(decisions: &[WhitelistDecision]) -> String {
    let accepted: Vec<&str> = decisions
        .iter()
        .filter(|d| d.verdict.is_accepted())
        .map(|d| d.source_ip.as_str())
        .collect();

    let mut out = String::from("\n\n[DEFAULT]\n\nignoreip_local =\n");
    for chunk in accepted.chunks(IPS_PER_LINE) {
        out.push_str(&format!("                 {} \n", chunk.join(" ")));
    }
    out.push_str(&format!("# IPs count: {}\n", accepted.len()));
    out
}

/// Write the draft atomically, keeping the previous draft as `.bak`
pub fn write_draft(path: &Path, decisions: &[WhitelistDecision]) -> Result<()> {
    let report_err = |source| WhitelistError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };

    let content = render(decisions);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(report_err)?;
    tmp.write_all(content.as_bytes()).map_err(report_err)?;

    if path.exists() {
        std::fs::rename(path, backup_path(path)).map_err(report_err)?;
    }

    tmp.persist(path).map_err(|e| report_err(e.error))?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}
