//! Deterministic advisory used when no model answers.

use crate::prompt::{HEADING_CRITICAL, HEADING_LONG_TERM, HEADING_QUICK_WINS, HEADING_SAVINGS};
use hawk_proto::{AnalysisReport, ResourceKind};
use std::fmt::Write;

pub fn fallback_advice(report: &AnalysisReport) -> String {
    let ec2_count = report.finding_count(ResourceKind::Ec2);
    let ebs_count = report.finding_count(ResourceKind::Ebs);
    let snapshot_count = report.finding_count(ResourceKind::Snapshot);
    let mut out = String::new();

    let _ = writeln!(out, "{HEADING_CRITICAL}");
    if ec2_count > 0 {
        let _ = writeln!(
            out,
            "{ec2_count} underutilized EC2 instance(s) are costing ${:.2}/month in unused capacity.",
            report.savings.ec2
        );
    } else {
        let _ = writeln!(out, "EC2 instances are properly utilized; no critical compute waste found.");
    }

    let _ = writeln!(out, "\n{HEADING_QUICK_WINS}");
    let mut wins = Vec::new();
    if let Some(first) = report.ec2.findings.first() {
        let detail = match first.cpu_average() {
            Some(cpu) => format!("at {cpu:.1}% average CPU"),
            None => "while stopped".to_string(),
        };
        wins.push(format!(
            "Right-size `{}` {detail}: {}",
            first.resource_id, first.recommendation
        ));
    }
    if ebs_count > 0 {
        wins.push(format!(
            "Clean up {ebs_count} EBS volume(s) to save ${:.2}/month",
            report.savings.ebs
        ));
    }
    if snapshot_count > 0 {
        wins.push(format!(
            "Delete {snapshot_count} snapshot(s) older than 90 days to save ${:.2}/month",
            report.savings.snapshots
        ));
    }
    if wins.is_empty() {
        wins.push("No immediate actions required; keep monitoring weekly".to_string());
    }
    for (i, win) in wins.iter().take(3).enumerate() {
        let _ = writeln!(out, "{}. {win}", i + 1);
    }

    let _ = writeln!(out, "\n{HEADING_LONG_TERM}");
    for item in [
        "Purchase Reserved Instances or Savings Plans for steady workloads",
        "Enable auto-scaling so capacity follows demand",
        "Apply cost allocation tags to every resource",
        "Review instance sizes quarterly",
    ] {
        let _ = writeln!(out, "- {item}");
    }

    let _ = writeln!(out, "\n{HEADING_SAVINGS}");
    let _ = writeln!(out, "Monthly savings: ${:.2}", report.total_savings);
    let _ = writeln!(out, "Annual savings: ${:.2}", report.annual_savings());
    let _ = writeln!(
        out,
        "\n_AI insights unavailable. Configure GEMINI_API_KEY for tailored recommendations._"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::fixtures::make_report;
    use chrono::Utc;
    use hawk_proto::ResourceSection;

    #[test]
    fn test_contains_total_and_sections() {
        let report = make_report(Utc::now(), 250.0);
        let text = fallback_advice(&report);
        assert!(text.contains("$70.00"));
        assert!(text.contains("Annual savings: $840.00"));
        assert!(text.contains("`i-0abc123` at 3.2% average CPU"));
        assert!(text.contains("Clean up 1 EBS volume(s) to save $10.00/month"));
        for heading in [HEADING_CRITICAL, HEADING_QUICK_WINS, HEADING_LONG_TERM, HEADING_SAVINGS] {
            assert!(text.contains(heading));
        }
    }

    #[test]
    fn test_clean_account() {
        let mut report = make_report(Utc::now(), 12.0);
        report.ec2 = ResourceSection::default();
        report.ebs = ResourceSection::default();
        report.savings = Default::default();
        report.total_savings = 0.0;
        let text = fallback_advice(&report);
        assert!(text.contains("properly utilized"));
        assert!(text.contains("1. No immediate actions required"));
        assert!(text.contains("Monthly savings: $0.00"));
    }
}
