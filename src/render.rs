//! ASCII tree rendering for previews and apply reports.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::engine::{ApplyReport, Plan, StepOp, StepStatus};

const CREATE: char = '+';
const UPDATE: char = '~';
const REPLACE: char = '±';
const DELETE: char = '-';
const SAME: char = '=';

fn op_symbol(op: StepOp) -> char {
    match op {
        StepOp::Create => CREATE,
        StepOp::Update => UPDATE,
        StepOp::Replace => REPLACE,
        StepOp::Delete => DELETE,
        StepOp::Same => SAME,
    }
}

/// Render a preview as a tree under the stack name.
///
/// Example output:
/// ```text
/// dev (2 changes)
/// ├── + static-site-bucket (bucket)
/// ├── = static-site-object-index.html (bucket_object)
/// └── - static-site-object-old.html (bucket_object)
/// ```
pub fn render_plan(plan: &Plan) -> String {
    let header = format!("{} ({} changes)", plan.stack, plan.changes());
    let lines: Vec<String> = plan
        .steps
        .iter()
        .map(|s| format!("{} {} ({})", op_symbol(s.op), s.name, s.kind))
        .collect();
    render_tree(&header, &lines)
}

/// Render an apply or destroy report. Failed and skipped steps carry their reason.
pub fn render_report(report: &ApplyReport) -> String {
    let header = if report.is_success() {
        report.stack.clone()
    } else {
        format!(
            "{} ({} failed, {} skipped)",
            report.stack,
            report.failed().len(),
            report.skipped().len()
        )
    };
    let lines: Vec<String> = report
        .steps
        .iter()
        .map(|s| {
            let line = format!("{} {} ({})", op_symbol(s.op), s.name, s.kind);
            match &s.status {
                StepStatus::Applied | StepStatus::Unchanged => line,
                StepStatus::Forgotten => format!("{} forgotten", line),
                StepStatus::Failed { reason } => format!("{} failed: {}", line, reason),
                StepStatus::Skipped { blocked_by } => {
                    format!("{} skipped: blocked by {}", line, blocked_by)
                }
            }
        })
        .collect();
    render_tree(&header, &lines)
}

/// One `key: value` line per export. String values are printed without quotes.
pub fn render_exports(exports: &BTreeMap<String, Value>) -> String {
    let mut output = String::new();
    for (key, value) in exports {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        output.push_str(&format!("{}: {}\n", key, value));
    }
    output
}

fn render_tree(root: &str, children: &[String]) -> String {
    let mut output = String::new();
    output.push_str(root);
    output.push('\n');
    for (i, child) in children.iter().enumerate() {
        let branch = if i == children.len() - 1 {
            "└── "
        } else {
            "├── "
        };
        output.push_str(branch);
        output.push_str(child);
        output.push('\n');
    }
    output
}
