//! Prompt Templates for Oracle Operations
//!
//! Builds the structured prompts sent to the oracle. Each prompt embeds all
//! context needed for that decision, since oracle calls carry no state
//! between them.

use crate::models::{PatternCategory, RequirementsRecord, TestCase, TestSuiteVersion};
use crate::patterns::FileFacts;

/// Render the current requirements as a prompt section
fn requirements_context(record: &RequirementsRecord) -> String {
    fn section(title: &str, items: &[String]) -> String {
        if items.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = items.iter().map(|i| format!("- {}", i)).collect();
        format!("### {}\n{}\n", title, lines.join("\n"))
    }

    format!(
        "## Current Requirements\n{}{}{}{}{}",
        section("Functional", &record.functional),
        section("Business rules", &record.business_rules),
        section("User workflows", &record.user_workflows),
        section("Performance", &record.performance),
        section("Accessibility", &record.accessibility),
    )
}

/// Render the existing test cases as a prompt section
fn existing_cases_context(cases: &[TestCase]) -> String {
    if cases.is_empty() {
        return "## Existing Test Cases\n(none - this is the first synchronization)\n".to_string();
    }

    let rendered: Vec<String> = cases
        .iter()
        .map(|c| {
            serde_json::to_string_pretty(c).unwrap_or_else(|_| format!("{{\"id\": \"{}\"}}", c.id))
        })
        .collect();

    format!(
        "## Existing Test Cases\n```json\n[\n{}\n]\n```\n",
        rendered.join(",\n")
    )
}

/// Build the synchronization prompt for one subject.
///
/// The editing rules are the contract that keeps the store safe: ids are
/// never reused, cases are deprecated instead of dropped, and unchanged
/// cases are preserved verbatim.
pub fn build_sync_prompt(
    subject: &str,
    prefix: &str,
    existing: &TestSuiteVersion,
    requirements: &RequirementsRecord,
) -> String {
    format!(
        r#"You maintain the test-case suite for the subject "{subject}".

{existing_section}
{requirements_section}
## Editing Rules
1. Preserve every currently valid test case verbatim, including its "id" and "addedInVersion".
2. Mark a case "updated" only when its content actually changes, and attach a short "changes" note describing what changed.
3. When a case is no longer supported by any requirement, mark it "deprecated". Never omit a case from your reply.
4. Never reuse another case's id. For genuinely new cases assign sequential ids with the prefix "{prefix}" (e.g. {prefix}-004 after {prefix}-003).
5. Each case object has: id, title, description, priority (critical|high|medium|low), category, status (new|active|updated|deprecated), steps (non-empty list of strings), expectedResult, tags (list of strings), and changes (only when status is "updated").

Reply with ONLY a JSON array of test case objects covering the full suite.
"#,
        subject = subject,
        prefix = prefix,
        existing_section = existing_cases_context(&existing.test_cases),
        requirements_section = requirements_context(requirements),
    )
}

/// Build the pattern-learning prompt from extracted structural facts
pub fn build_pattern_prompt(facts: &[FileFacts]) -> String {
    let mut context = String::new();
    for file in facts {
        context.push_str(&format!("### {}\n", file.path));
        if !file.functions.is_empty() {
            context.push_str(&format!("Functions: {}\n", file.functions.join(", ")));
        }
        if !file.types.is_empty() {
            context.push_str(&format!("Types: {}\n", file.types.join(", ")));
        }
        if !file.imports.is_empty() {
            context.push_str(&format!("Imports: {}\n", file.imports.join(", ")));
        }
    }

    let categories: Vec<String> = PatternCategory::ALL
        .iter()
        .map(|c| {
            // JSON key form of the category, e.g. "domainRule"
            serde_json::to_string(c).unwrap_or_default().replace('"', "")
        })
        .collect();

    format!(
        r#"You analyze a codebase to derive reusable pattern rules for test generation.

## Structural Facts
{context}
## Task
Propose pattern rules in exactly these five categories: {categories}.
Each rule has: name, matchTokens (list of identifier fragments), regex (a valid regular expression matching the construct in source code), confidence (low|medium|high), and context (one sentence on when the rule applies).

Reply with ONLY a JSON object mapping each category name to a list of rule objects.
"#,
        context = context,
        categories = categories.join(", "),
    )
}
