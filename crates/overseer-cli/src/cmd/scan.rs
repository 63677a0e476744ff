use crate::output::print_json;
use crate::session::Session;
use overseer_core::feedback::{self, NewFeedback, Severity};
use overseer_core::scan::{FileReport, IssueKind, Scanner};

pub fn run(session: &Session, record: bool, json: bool) -> anyhow::Result<()> {
    let scanner = Scanner::new(&session.config.scan)?;
    let reports = scanner.scan_tree(&session.target)?;

    let recorded = if record {
        let batch = reports.iter().map(to_feedback).collect();
        feedback::add_many(&session.state_dir, batch)?
    } else {
        Vec::new()
    };

    if json {
        return print_json(&serde_json::json!({
            "files": reports,
            "recorded": recorded,
        }));
    }

    if reports.is_empty() {
        println!("No issues found.");
        return Ok(());
    }
    for report in &reports {
        println!("{}", report.path.display());
        for issue in &report.issues {
            println!("  {:>5}  {:<14} {}", issue.line, issue.kind.as_str(), issue.detail);
        }
    }
    let total: usize = reports.iter().map(|r| r.issues.len()).sum();
    println!("\n{total} issue(s) in {} file(s)", reports.len());
    if !recorded.is_empty() {
        let ids: Vec<&str> = recorded.iter().map(|e| e.id.as_str()).collect();
        println!("Recorded feedback: {}", ids.join(", "));
    }
    Ok(())
}

fn to_feedback(report: &FileReport) -> NewFeedback {
    let count = |kind: IssueKind| report.issues.iter().filter(|i| i.kind == kind).count();
    let broken = count(IssueKind::BrokenLink);
    let markers = count(IssueKind::Marker);
    let empty = count(IssueKind::EmptySection);
    NewFeedback {
        kind: "content_issues".to_string(),
        message: format!(
            "{broken} broken link(s), {markers} marker(s), {empty} empty section(s)"
        ),
        severity: if broken > 0 {
            Severity::Warning
        } else {
            Severity::Info
        },
        location: Some(report.path.display().to_string()),
    }
}
