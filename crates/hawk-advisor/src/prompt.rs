//! Prompt construction for advisories and free-form questions.

use chrono::{DateTime, Utc};
use hawk_proto::{AnalysisReport, HistoryEntry, ResourceKind};
use std::fmt::Write;

pub const HEADING_CRITICAL: &str = "## 🚨 Critical Issues";
pub const HEADING_QUICK_WINS: &str = "## ⚡ Quick Wins";
pub const HEADING_LONG_TERM: &str = "## 📈 Long-term Strategy";
pub const HEADING_SAVINGS: &str = "## 💰 Savings Impact";

/// Most recent history entries included in an advisory prompt.
pub const HISTORY_CONTEXT_LIMIT: usize = 5;

/// One line per entry: `[2026-03-01] Cost: $412.50, Underutilized EC2: 3, EBS: 1`.
pub fn history_lines(history: &[HistoryEntry], limit: usize) -> String {
    history
        .iter()
        .take(limit)
        .map(|e| {
            format!(
                "[{}] Cost: ${:.2}, Underutilized EC2: {}, EBS: {}",
                e.analyzed_at.format("%Y-%m-%d"),
                e.report.cost.current,
                e.report.finding_count(ResourceKind::Ec2),
                e.report.finding_count(ResourceKind::Ebs),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn advice_prompt(report: &AnalysisReport, history: &[HistoryEntry]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are an AWS Cloud Cost Optimization expert. Write EXACTLY 150-200 words of advice."
    );
    let _ = writeln!(
        prompt,
        "\nDATA: Monthly cost ${:.2} (forecast ${:.2}), {} EC2 instances ({} running), \
         potential savings ${:.2}/month.",
        report.cost.current,
        report.cost.forecast,
        report.ec2.inventory.len(),
        report.running_instances(),
        report.total_savings,
    );
    let _ = writeln!(
        prompt,
        "ISSUES: {} underutilized EC2, {} unattached/over-provisioned EBS, {} old snapshots, \
         {} Lambda, {} RDS.",
        report.finding_count(ResourceKind::Ec2),
        report.finding_count(ResourceKind::Ebs),
        report.finding_count(ResourceKind::Snapshot),
        report.finding_count(ResourceKind::Lambda),
        report.finding_count(ResourceKind::Rds),
    );

    let top: Vec<String> = report
        .findings()
        .filter(|f| f.estimated_monthly_savings > 0.0)
        .take(5)
        .map(|f| format!("- `{}` ({}): {}", f.resource_id, f.kind, f.reason))
        .collect();
    if !top.is_empty() {
        let _ = writeln!(prompt, "\nTOP FINDINGS:\n{}", top.join("\n"));
    }

    if !history.is_empty() {
        let _ = writeln!(
            prompt,
            "\nHISTORY (newest first):\n{}",
            history_lines(history, HISTORY_CONTEXT_LIMIT)
        );
    }

    let _ = writeln!(prompt, "\nFORMAT:");
    let _ = writeln!(prompt, "{HEADING_CRITICAL}\n(1-2 sentences on the biggest problem)");
    let _ = writeln!(prompt, "{HEADING_QUICK_WINS}\n1. ...\n2. ...\n3. ...");
    let _ = writeln!(prompt, "{HEADING_LONG_TERM}\n- ...\n- ...");
    let _ = writeln!(
        prompt,
        "{HEADING_SAVINGS}\nMonthly savings: $X\nAnnual savings: $Y"
    );
    let _ = writeln!(
        prompt,
        "\nRULES: use ## headers exactly as shown, wrap resource IDs in backticks, \
         use only the numbers given above."
    );
    prompt
}

/// Plain-text prompt for a free-form question, optionally grounded on the
/// user's latest analysis.
pub fn question_prompt(question: &str, context: Option<&HistoryEntry>, now: DateTime<Utc>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are an AWS cost optimization assistant. Answer in plain text without markdown, \
         in at most 200 words."
    );
    let _ = writeln!(prompt, "Current date and time: {}", now.format("%Y-%m-%d %H:%M UTC"));
    if let Some(entry) = context {
        let r = &entry.report;
        let _ = writeln!(
            prompt,
            "\nContext from the latest analysis ({}):\nMonthly Cost: ${:.2}\nInstances: {}\n\
             Underutilized EC2: {}\nUnderutilized EBS: {}",
            entry.analyzed_at.format("%Y-%m-%d"),
            r.cost.current,
            r.ec2.inventory.len(),
            r.finding_count(ResourceKind::Ec2),
            r.finding_count(ResourceKind::Ebs),
        );
    }
    let _ = writeln!(prompt, "\nQuestion: {}", question.trim());
    prompt
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};
    use hawk_proto::*;
    use uuid::Uuid;

    pub fn make_finding(kind: ResourceKind, id: &str, savings: f64) -> Finding {
        Finding {
            kind,
            resource_id: id.to_string(),
            resource_type: Some("t3.large".to_string()),
            name: None,
            rule: FindingRule::LowCpu,
            usage: UsageMetrics::Compute {
                cpu_average: 3.2,
                cpu_maximum: 9.0,
                network_in_bytes: 0.0,
            },
            reason: "CPU utilization was 3.2% average".to_string(),
            estimated_monthly_savings: savings,
            recommendation: "Downsize to t3.small".to_string(),
        }
    }

    pub fn make_report(at: DateTime<Utc>, cost: f64) -> AnalysisReport {
        let ec2 = ResourceSection {
            inventory: vec![],
            findings: vec![make_finding(ResourceKind::Ec2, "i-0abc123", 60.0)],
        };
        let ebs = ResourceSection {
            inventory: vec![],
            findings: vec![Finding {
                kind: ResourceKind::Ebs,
                rule: FindingRule::Unattached,
                usage: UsageMetrics::Volume {
                    size_gb: 100,
                    iops_utilization_pct: None,
                },
                ..make_finding(ResourceKind::Ebs, "vol-0def", 10.0)
            }],
        };
        let savings = SavingsBreakdown {
            ec2: 60.0,
            ebs: 10.0,
            ..SavingsBreakdown::default()
        };
        AnalysisReport {
            id: Uuid::new_v4(),
            generated_at: at,
            account_id: Some("123456789012".to_string()),
            primary_region: "us-east-1".to_string(),
            region: "us-east-1".to_string(),
            regions_scanned: vec!["us-east-1".to_string()],
            cost: CostSummary {
                current: cost,
                forecast: cost * 1.05,
                ..CostSummary::default()
            },
            ec2,
            ebs,
            snapshots: ResourceSection::default(),
            lambda: ResourceSection::default(),
            rds: ResourceSection::default(),
            total_savings: savings.total(),
            savings,
            collector_failures: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::make_report;
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_history_lines_capped() {
        let base = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let history: Vec<HistoryEntry> = (0..7)
            .map(|i| HistoryEntry::new("u1", make_report(base - Duration::days(i), 100.0 + i as f64)))
            .collect();
        let lines = history_lines(&history, HISTORY_CONTEXT_LIMIT);
        assert_eq!(lines.lines().count(), 5);
        assert_eq!(
            lines.lines().next(),
            Some("[2026-03-10] Cost: $100.00, Underutilized EC2: 1, EBS: 1")
        );
    }

    #[test]
    fn test_advice_prompt_carries_numbers_and_format() {
        let report = make_report(Utc::now(), 412.5);
        let prompt = advice_prompt(&report, &[]);
        assert!(prompt.contains("150-200 words"));
        assert!(prompt.contains("$412.50"));
        assert!(prompt.contains("$70.00/month"));
        assert!(prompt.contains("`i-0abc123`"));
        for heading in [HEADING_CRITICAL, HEADING_QUICK_WINS, HEADING_LONG_TERM, HEADING_SAVINGS] {
            assert!(prompt.contains(heading));
        }
        assert!(!prompt.contains("HISTORY"));
    }

    #[test]
    fn test_question_prompt_context_optional() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap();
        let bare = question_prompt("  How do I cut S3 costs? ", None, now);
        assert!(bare.contains("Question: How do I cut S3 costs?"));
        assert!(bare.contains("2026-03-10 09:30 UTC"));
        assert!(!bare.contains("Monthly Cost"));

        let entry = HistoryEntry::new("u1", make_report(now, 88.0));
        let grounded = question_prompt("What next?", Some(&entry), now);
        assert!(grounded.contains("Monthly Cost: $88.00"));
        assert!(grounded.contains("Underutilized EC2: 1"));
    }
}
