//! Human-readable CLI output.
//!
//! `--json` output bypasses this module and serializes the same values.

use keeper_ensemble::registry::MemberOrigin;
use keeper_ensemble::{EnsembleSnapshot, NodeStatus};

/// One-line status, e.g. `active: confluent-zookeeper running`.
pub fn status_line(status: &NodeStatus) -> String {
    status.to_string()
}

/// Multi-line membership summary.
pub fn snapshot_detail(snapshot: &EnsembleSnapshot) -> String {
    let mut out = String::new();
    let self_id = snapshot
        .self_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unassigned".to_string());
    out.push_str(&format!("  Member id: {self_id}\n"));
    out.push_str(&format!(
        "  Members:   {}/{}{}\n",
        snapshot.members.len(),
        snapshot.expected_size,
        if snapshot.is_ready() { " (ready)" } else { "" }
    ));
    for member in &snapshot.members {
        let marker = match member.origin {
            MemberOrigin::Local => "*",
            MemberOrigin::Remote => " ",
        };
        out.push_str(&format!(
            "  {marker} server.{}={}\n",
            member.id, member.endpoint
        ));
    }
    out
}

/// Print a serializable value as JSON without panicking on failure.
pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize output: {e}"),
    }
}
