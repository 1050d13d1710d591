//! Length-bounded rendering of execution history.
//!
//! The digest keeps, in priority order: the attempts made at the current
//! step, a summary of the previous step, then as many of the most recent
//! older lines as fit. Lines are never cut in the middle except when a single
//! current-step line alone exceeds the budget.

use crate::models::StepRecord;

const SECTION_SEPARATOR: &str = "\n\n";
const EXTRACTED_VALUE_ACTIONS: [&str; 1] = ["GET_TEXT"];

/// Truncate a value extracted from the page to `limit` characters
pub fn truncate_extracted_value(value: &str, limit: usize) -> String {
    let total = value.chars().count();
    if total <= limit {
        return value.to_string();
    }

    let shown: String = value.chars().take(limit).collect();
    format!(
        "{}[Value is truncated, shown {} out of {} characters]",
        shown, limit, total
    )
}

/// Apply [`truncate_extracted_value`] to every text-extraction command result
pub fn truncate_command_results(records: &mut [StepRecord], limit: usize) {
    for record in records.iter_mut() {
        for command in record.commands.iter_mut() {
            let is_extraction = EXTRACTED_VALUE_ACTIONS
                .iter()
                .any(|a| command.action.eq_ignore_ascii_case(a));
            if !is_extraction {
                continue;
            }
            if let Some(result) = command.result.as_mut() {
                *result = truncate_extracted_value(result, limit);
            }
        }
    }
}

pub fn format_step_record(record: &StepRecord) -> String {
    let status = if record.success { "SUCCESS" } else { "FAILED" };
    let mut line = format!(
        "Step {} (attempt {}): {} -> {}",
        record.step_index + 1,
        record.attempt,
        record.content,
        status
    );

    if let Some(error) = &record.error {
        line.push_str(&format!(" ({})", error));
    }

    if !record.commands.is_empty() {
        let commands: Vec<String> = record
            .commands
            .iter()
            .map(|c| {
                let mut s = c.action.clone();
                if let Some(selector) = &c.selector {
                    s.push_str(&format!(" {}", selector));
                }
                if let Some(result) = &c.result {
                    s.push_str(&format!(" = {}", result));
                }
                if !c.success {
                    s.push_str(" [failed]");
                }
                s
            })
            .collect();
        line.push_str(&format!("; commands: {}", commands.join(" | ")));
    }

    line
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn tail_chars(s: &str, n: usize) -> String {
    let total = char_len(s);
    s.chars().skip(total.saturating_sub(n)).collect()
}

/// Keep the newest lines that fit in `budget`, in their original order
fn tail_lines(header: &str, lines: &[String], budget: usize) -> Option<String> {
    let header_len = char_len(header) + 1;
    if budget <= header_len {
        return None;
    }

    let mut used = header_len;
    let mut kept: Vec<&str> = Vec::new();
    for line in lines.iter().rev() {
        let cost = char_len(line) + if kept.is_empty() { 0 } else { 1 };
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(line);
    }

    if kept.is_empty() {
        return None;
    }
    kept.reverse();
    Some(format!("{}\n{}", header, kept.join("\n")))
}

/// Render history for the prompt, bounded to `budget` characters
pub fn render_history_digest(records: &[StepRecord], current_index: usize, budget: usize) -> String {
    if records.is_empty() || budget == 0 {
        return String::new();
    }

    let previous_index = current_index.checked_sub(1);

    let current: Vec<String> = records
        .iter()
        .filter(|r| r.step_index == current_index)
        .map(format_step_record)
        .collect();
    let previous = previous_index.and_then(|idx| {
        records
            .iter()
            .filter(|r| r.step_index == idx)
            .max_by_key(|r| r.attempt)
            .map(format_step_record)
    });
    let older: Vec<String> = records
        .iter()
        .filter(|r| r.step_index != current_index && Some(r.step_index) != previous_index)
        .map(format_step_record)
        .collect();

    let mut remaining = budget;
    let mut current_block = None;

    if !current.is_empty() {
        let header = "Current step attempts:";
        let whole = format!("{}\n{}", header, current.join("\n"));
        if char_len(&whole) <= remaining {
            remaining -= char_len(&whole);
            current_block = Some(whole);
        } else {
            // The current step alone exceeds the budget: keep its newest part
            let block = tail_lines(header, &current, remaining)
                .unwrap_or_else(|| tail_chars(&whole, remaining));
            return block;
        }
    }

    let mut previous_block = None;
    if let Some(summary) = previous {
        let sep = if current_block.is_some() {
            char_len(SECTION_SEPARATOR)
        } else {
            0
        };
        let line = format!("Previous step: {}", summary);
        // Whole line or nothing
        if sep + char_len(&line) <= remaining {
            remaining -= sep + char_len(&line);
            previous_block = Some(line);
        }
    }

    let mut older_block = None;
    if !older.is_empty() {
        let has_later = current_block.is_some() || previous_block.is_some();
        let sep = if has_later {
            char_len(SECTION_SEPARATOR)
        } else {
            0
        };
        if remaining > sep {
            let header = "Earlier steps:";
            older_block = tail_lines(header, &older, remaining - sep);
        }
    }

    [older_block, previous_block, current_block]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommandRecord;

    #[test]
    fn test_truncation_message_format() {
        let value = "x".repeat(150);
        let truncated = truncate_extracted_value(&value, 100);
        assert_eq!(
            truncated,
            format!(
                "{}[Value is truncated, shown 100 out of 150 characters]",
                "x".repeat(100)
            )
        );
    }

    #[test]
    fn test_short_values_untouched() {
        assert_eq!(truncate_extracted_value("hello", 100), "hello");
        assert_eq!(truncate_extracted_value(&"y".repeat(100), 100), "y".repeat(100));
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let value = "é".repeat(12);
        assert_eq!(
            truncate_extracted_value(&value, 10),
            format!(
                "{}[Value is truncated, shown 10 out of 12 characters]",
                "é".repeat(10)
            )
        );
    }

    #[test]
    fn test_only_get_text_results_are_truncated() {
        let mut records = vec![StepRecord::new(0, "Read the title", true)
            .with_command(CommandRecord::new("GET_TEXT", true).with_result("a".repeat(50)))
            .with_command(CommandRecord::new("CLICK", true).with_result("b".repeat(50)))];

        truncate_command_results(&mut records, 10);

        let commands = &records[0].commands;
        assert!(commands[0]
            .result
            .as_deref()
            .unwrap()
            .ends_with("[Value is truncated, shown 10 out of 50 characters]"));
        assert_eq!(commands[1].result.as_deref(), Some("b".repeat(50).as_str()));
    }

    fn history() -> Vec<StepRecord> {
        vec![
            StepRecord::new(0, "Open the home page", true),
            StepRecord::new(1, "Accept the cookie banner", true),
            StepRecord::new(2, "Search for shoes", true),
            StepRecord::new(3, "Open the first result", false)
                .with_error("selector not found"),
            StepRecord::new(3, "Open the first result", false).with_attempt(2),
        ]
    }

    #[test]
    fn test_digest_fits_everything_with_large_budget() {
        let digest = render_history_digest(&history(), 3, 10_000);
        assert!(digest.starts_with("Earlier steps:"));
        assert!(digest.contains("Step 1 (attempt 1): Open the home page"));
        assert!(digest.contains("Previous step: Step 3 (attempt 1): Search for shoes"));
        assert!(digest.contains("Current step attempts:"));
        assert!(digest.contains("Step 4 (attempt 2)"));
        assert!(digest.find("Earlier steps").unwrap() < digest.find("Previous step").unwrap());
    }

    #[test]
    fn test_digest_drops_oldest_lines_first() {
        let full = render_history_digest(&history(), 3, 10_000);
        let budget = full.chars().count() - 10;
        let digest = render_history_digest(&history(), 3, budget);

        assert!(digest.chars().count() <= budget);
        assert!(!digest.contains("Open the home page"));
        assert!(digest.contains("Accept the cookie banner"));
        assert!(digest.contains("Previous step"));
        assert!(digest.contains("Current step attempts"));
    }

    #[test]
    fn test_current_attempts_win_over_everything() {
        let records = history();
        let current_only = render_history_digest(&records[3..], 3, 10_000);
        let digest = render_history_digest(&records, 3, current_only.chars().count());

        assert_eq!(digest, current_only);
        assert!(!digest.contains("Previous step"));
        assert!(!digest.contains("Earlier steps"));
    }

    #[test]
    fn test_oversized_current_step_keeps_tail() {
        let records = vec![StepRecord::new(0, "z".repeat(500), false)];
        let digest = render_history_digest(&records, 0, 40);
        assert_eq!(digest.chars().count(), 40);
        assert!(digest.ends_with("FAILED"));
    }

    #[test]
    fn test_previous_step_is_never_cut() {
        let records = vec![StepRecord::new(0, "Open the home page", true)];
        assert_eq!(render_history_digest(&records, 1, 30), "");

        let full = render_history_digest(&records, 1, 10_000);
        assert_eq!(full, "Previous step: Step 1 (attempt 1): Open the home page -> SUCCESS");
        assert_eq!(render_history_digest(&records, 1, full.chars().count()), full);
    }

    #[test]
    fn test_oversized_previous_step_leaves_room_for_older() {
        let mut records = history();
        records[2] = StepRecord::new(2, "s".repeat(200), true);
        let digest = render_history_digest(&records[..3], 3, 120);

        assert!(!digest.contains("Previous step"));
        assert!(digest.contains("Accept the cookie banner"));
        assert!(digest.chars().count() <= 120);
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(render_history_digest(&[], 2, 100), "");
    }
}
