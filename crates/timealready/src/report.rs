//! Human and JSON renderings of a [`FixOutcome`].

use coordination::escalation::FixOutcome;

const RULE: &str = "============================================================";

/// Plain-text report printed at the end of a session.
pub fn render_text(outcome: &FixOutcome) -> String {
    let mut out = String::new();
    if outcome.success {
        out.push_str(&format!("{RULE}\nSUCCESS - FIX GENERATED\n{RULE}\n"));
        if let Some((file, line)) = outcome.location() {
            out.push_str(&format!("File: {file}\nLine: {line}\n"));
        }
        if let Some(strategy) = &outcome.fix_strategy {
            out.push_str(&format!("Strategy: {strategy}\n"));
        }
        if let Some(diff) = outcome.diff.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!("\nDiff:\n{diff}\n"));
        }
        out.push('\n');
        out.push_str(&format!("Cost: ${:.6}\n", outcome.total_cost));
        if let Some(model) = outcome.model_used {
            out.push_str(&format!("Model: {model}\n"));
        }
    } else {
        out.push_str(&format!("FAILED: {}\n", outcome.message));
        if let Some((file, line)) = outcome.location() {
            out.push_str(&format!("File: {file}\nLine: {line}\n"));
        }
        if outcome.total_cost > 0.0 {
            out.push_str(&format!("Cost: ${:.6}\n", outcome.total_cost));
        }
    }
    out
}

/// Pretty JSON of the whole outcome.
pub fn render_json(outcome: &FixOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(outcome)
}
