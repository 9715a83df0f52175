// src/memory/digest.rs — Bounded summaries of prior iterations
//
// The digest is what earlier attempts look like to the next generation
// request. It must be deterministic for a given history and degrade by
// dropping the oldest iterations first, never by failing.

use crate::core::types::IterationRecord;
use crate::sandbox::OutcomeStatus;

/// Bounded-size summary of prior attempts, errors, and scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDigest {
    pub text: String,
    pub token_estimate: u32,
    /// True when older entries were dropped to fit the budget.
    pub truncated: bool,
}

impl ContextDigest {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            token_estimate: 0,
            truncated: false,
        }
    }
}

/// Rough token count: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Render one iteration as a single digest line.
fn iteration_line(record: &IterationRecord) -> String {
    let status = if record.degraded { "✗" } else { "✓" };
    let score = match record.overall_score {
        Some(s) => format!("{s:.5}"),
        None => "n/a".into(),
    };

    let mut line = format!("{}. [{}] score={}", record.index + 1, status, score);

    for phase in &record.phases {
        if phase.attempts > 1 || phase.degraded {
            line.push_str(&format!(
                " | {} {}x{}",
                phase.spec.name,
                phase.outcome.status,
                phase.attempts
            ));
        }
    }

    if let Some(err) = record
        .phases
        .iter()
        .filter(|p| p.outcome.status != OutcomeStatus::Success)
        .find_map(|p| p.outcome.error_head())
    {
        let err: String = err.chars().take(160).collect();
        line.push_str(&format!(" | err: {err}"));
    }

    line
}

/// Summarize the record history into at most `max_tokens` of context.
pub fn summarize(
    records: &[IterationRecord],
    untried_features: &[String],
    best_score: Option<f64>,
    max_tokens: u32,
) -> ContextDigest {
    if records.is_empty() {
        return ContextDigest::empty();
    }

    let footer = {
        let mut f = String::new();
        if let Some(best) = best_score {
            f.push_str(&format!("\nBest score so far: {best:.5}"));
        }
        f.push_str(&format!("\nTotal iterations: {}", records.len()));
        if !untried_features.is_empty() {
            f.push_str("\nUntried feature ideas:");
            for idea in untried_features.iter().take(5) {
                f.push_str(&format!("\n- {idea}"));
            }
        }
        f
    };

    let lines: Vec<String> = records.iter().map(iteration_line).collect();
    let header = "## Prior attempts\n";

    // Drop oldest lines until the digest fits the budget. The footer and
    // the newest line always survive.
    let mut start = 0;
    loop {
        let body = lines[start..].join("\n");
        let text = format!("{header}{body}{footer}");
        if estimate_tokens(&text) <= max_tokens || start + 1 >= lines.len() {
            return ContextDigest {
                token_estimate: estimate_tokens(&text),
                truncated: start > 0,
                text,
            };
        }
        start += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IterationRecord;
    use pretty_assertions::assert_eq;

    fn record(index: u32) -> IterationRecord {
        IterationRecord::new(index, vec![])
    }

    #[test]
    fn test_empty_history_empty_digest() {
        let d = summarize(&[], &[], None, 1000);
        assert_eq!(d, ContextDigest::empty());
    }

    #[test]
    fn test_digest_idempotent() {
        let records = vec![record(0), record(1)];
        let a = summarize(&records, &["target encoding".into()], Some(0.7), 500);
        let b = summarize(&records, &["target encoding".into()], Some(0.7), 500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_contains_scores_and_footer() {
        let records = vec![record(0)];
        let d = summarize(&records, &[], Some(0.71234), 1000);
        assert!(d.text.contains("Best score so far: 0.71234"));
        assert!(d.text.contains("Total iterations: 1"));
        assert!(!d.truncated);
    }

    #[test]
    fn test_digest_truncates_oldest_first() {
        let records: Vec<IterationRecord> = (0..50).map(record).collect();
        let d = summarize(&records, &[], None, 40);
        assert!(d.truncated);
        // The newest iteration survives truncation
        assert!(d.text.contains("50. [✓]"));
        // The oldest does not
        assert!(!d.text.contains("\n1. [✓]"));
    }

    #[test]
    fn test_untried_features_listed() {
        let d = summarize(
            &[record(0)],
            &["ratio features".into(), "date parts".into()],
            None,
            1000,
        );
        assert!(d.text.contains("- ratio features"));
        assert!(d.text.contains("- date parts"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
