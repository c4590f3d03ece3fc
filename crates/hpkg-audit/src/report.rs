//! Human-readable audit output.

use std::collections::BTreeSet;

use crate::Finding;

/// Format findings as a report ending in a pass/fail line.
pub fn format_report(findings: &[Finding]) -> String {
    let mut out = String::new();

    for finding in findings {
        out.push_str(&format!("  [{}] {}\n", finding.check, finding.summary));
        for detail in &finding.details {
            out.push_str(&format!("    ! {detail}\n"));
        }
    }

    let checks: BTreeSet<&str> = findings.iter().map(|f| f.check).collect();
    if !findings.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!(
        "Summary: {} findings in {} checks\n",
        findings.len(),
        checks.len()
    ));

    if findings.is_empty() {
        out.push_str("Audit: PASSED\n");
    } else {
        out.push_str("Audit: ISSUES FOUND\n");
    }

    out
}
