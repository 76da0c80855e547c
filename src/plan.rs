//! Canonical plan text: parsing, rendering, and the `(agent, capability)`
//! step type shared by the Planner and the Executor.
//!
//! Plan lines are simple enough for manual scanning, so no `regex`
//! dependency is introduced for this one marker format.

const ARROW: &str = "\u{2192}";

/// One `(agent, capability)` step in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub agent: String,
    pub capability: String,
}

/// The result of scanning a single line of plan text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Step(Step),
    /// A non-blank line that did not match `"N. <agent> → <capability>"`.
    Unrecognized(String),
}

/// Scan `text` line by line, classifying each non-blank line as a [`Step`] or
/// as [`ParsedLine::Unrecognized`]. Blank lines are dropped entirely.
pub fn parse_lines(text: &str) -> Vec<ParsedLine> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match parse_step_line(line) {
            Some(step) => ParsedLine::Step(step),
            None => ParsedLine::Unrecognized(line.to_string()),
        })
        .collect()
}

/// The Planner's view: only the recognized steps, in order. Unrecognized
/// lines (stray prose) are silently dropped — no prose passes through to the
/// Executor.
pub fn parse(text: &str) -> Vec<Step> {
    parse_lines(text)
        .into_iter()
        .filter_map(|line| match line {
            ParsedLine::Step(step) => Some(step),
            ParsedLine::Unrecognized(_) => None,
        })
        .collect()
}

fn parse_step_line(line: &str) -> Option<Step> {
    let mut chars = line.char_indices();
    let mut digits_end = None;
    for (i, c) in &mut chars {
        if c.is_ascii_digit() {
            digits_end = Some(i + c.len_utf8());
        } else {
            break;
        }
    }
    let digits_end = digits_end?;
    let rest = line[digits_end..].strip_prefix('.')?;
    let rest = rest.trim_start();

    let (agent, capability) = if let Some(idx) = rest.find(ARROW) {
        (&rest[..idx], &rest[idx + ARROW.len()..])
    } else if let Some(idx) = rest.find("->") {
        (&rest[..idx], &rest[idx + 2..])
    } else {
        return None;
    };

    let agent = agent.trim();
    let capability = capability.trim();
    if agent.is_empty() || capability.is_empty() {
        return None;
    }

    Some(Step {
        agent: agent.to_string(),
        capability: capability.to_string(),
    })
}

/// Render `steps` back to canonical plan text, renumbered from 1 with the
/// arrow normalized to U+2192.
pub fn render(steps: &[Step]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {} {} {}", i + 1, step.agent, ARROW, step.capability))
        .collect::<Vec<_>>()
        .join("\n")
}
