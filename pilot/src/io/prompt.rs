//! Planner system prompt rendering.
//!
//! The template marks each part with `<!-- section:KEY required|droppable -->`.
//! After rendering, droppable sections are removed until the prompt fits the
//! byte budget; required sections are always kept.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::types::{ExecutionRecord, START_SERVER_SENTINEL};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// Sections removed, in order, when the prompt is over budget.
const DROP_ORDER: &[&str] = &["history"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex is valid")
});

/// Everything the planner template needs to describe the project.
#[derive(Debug, Clone)]
pub struct PlannerPromptInputs<'a> {
    pub project_root: String,
    pub goal: &'a str,
    pub allowed_verbs: &'a [String],
    pub server_command: &'a str,
    pub smoke_command: &'a str,
    pub health_url: &'a str,
    pub server_running: bool,
    /// Most recent session records, oldest first.
    pub history: &'a [ExecutionRecord],
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Renders the planner prompt within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_planner(&self, input: &PlannerPromptInputs<'_>) -> Result<String> {
        let rendered = render_planner(input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

fn render_planner(input: &PlannerPromptInputs<'_>) -> Result<String> {
    let history = if input.history.is_empty() {
        None
    } else {
        Some(serde_json::to_string_pretty(input.history).context("serialize prompt history")?)
    };

    let mut env = Environment::new();
    env.add_template("planner", PLANNER_TEMPLATE)
        .context("load planner template")?;
    let template = env.get_template("planner")?;
    let rendered = template
        .render(context! {
            project_root => input.project_root.as_str(),
            goal => input.goal.trim(),
            allowed_verbs => input.allowed_verbs,
            sentinel => START_SERVER_SENTINEL,
            server_command => input.server_command,
            smoke_command => input.smoke_command,
            health_url => input.health_url,
            server_running => input.server_running,
            history => history,
        })
        .context("render planner template")?;
    Ok(rendered)
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            let removed = sections.remove(idx);
            debug!(section = key, bytes_dropped = removed.content.len(), "dropped section for budget");
        }
    }
    let total = total_len(sections);
    if total > budget {
        warn!(total, budget, "planner prompt exceeds budget with required sections only");
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
