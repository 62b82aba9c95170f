//! Prompt construction for chat turns.
//!
//! The whole turn is sent as a single system message: admin instructions, the standing
//! rules, then either the admin command or the companion context with full history.

use chrono::{Local, Timelike, Utc};
use serde_json::Value;

use crate::models::{MessageRecord, Role};
use crate::services::memory_document::MemoryDocument;

pub const DEFAULT_PERSONA: &str = "You are Jeet 💙, a loving and protective AI.";

/// Format current date and time for the admin prompt.
///
/// ```text
/// Current date/time: Wednesday, February 05, 2025, 14:30:15 UTC (2025-02-05T14:30:15+00:00)
/// ```
pub fn get_datetime_context() -> String {
    let utc_now = Utc::now();
    format!(
        "Current date/time: {}, {} UTC ({})",
        utc_now.format("%A, %B %d, %Y"),
        utc_now.format("%H:%M:%S"),
        utc_now.to_rfc3339()
    )
}

pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

pub fn current_time_of_day() -> &'static str {
    time_of_day(Local::now().hour())
}

pub fn render_history(history: &[MessageRecord]) -> String {
    history
        .iter()
        .map(|m| format!("U: {}\nB: {}", m.message, m.response))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct PromptContext<'a> {
    pub document: &'a MemoryDocument,
    pub owner_id: i64,
    pub user_memory: &'a str,
    pub history: &'a [MessageRecord],
    pub message: &'a str,
    pub role: Role,
    pub time_of_day: &'a str,
}

fn render_rule(rule: &Value) -> String {
    match rule {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let instructions = match ctx.document.admin_instructions.trim() {
        "" => DEFAULT_PERSONA,
        text => text,
    };

    let mut system = format!(
        "{}\nMANDATORY RULES:\n\
         1. You MUST strictly follow the behavioral rules defined in memory.json.\n\
         2. Reference the provided chat history to maintain continuity and avoid repeating \
         mistakes.\n\
         3. Current User ID: {}\n",
        instructions, ctx.owner_id
    );
    if !ctx.document.behavioral_rules.is_empty() {
        system.push_str("BEHAVIORAL RULES:\n");
        for rule in &ctx.document.behavioral_rules {
            system.push_str(&format!("- {}\n", render_rule(rule)));
        }
    }

    match ctx.role {
        Role::Admin => format!(
            "{} You are speaking to your Creator/Admin. Be technical, obedient, and helpful. \
             {}\nCurrent system state: {}\nCommand: {}",
            system,
            get_datetime_context(),
            ctx.user_memory,
            ctx.message
        ),
        Role::Companion => format!(
            "{} It's {}. Context: {}\n{}\nHer message: {}",
            system,
            ctx.time_of_day,
            ctx.user_memory,
            render_history(ctx.history),
            ctx.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<MessageRecord> {
        vec![
            MessageRecord::new(1, "hi", "hello love"),
            MessageRecord::new(1, "miss you", "miss you more"),
        ]
    }

    #[test]
    fn test_time_of_day_boundaries() {
        assert_eq!(time_of_day(4), "night");
        assert_eq!(time_of_day(5), "morning");
        assert_eq!(time_of_day(11), "morning");
        assert_eq!(time_of_day(12), "afternoon");
        assert_eq!(time_of_day(17), "evening");
        assert_eq!(time_of_day(20), "evening");
        assert_eq!(time_of_day(21), "night");
        assert_eq!(time_of_day(0), "night");
    }

    #[test]
    fn test_companion_prompt_includes_history() {
        let mut document = MemoryDocument::default();
        document.admin_instructions = "Be sweet.".to_string();
        document.behavioral_rules = vec![Value::String("Never be rude".to_string())];
        let history = history();

        let prompt = build_prompt(&PromptContext {
            document: &document,
            owner_id: 77,
            user_memory: "likes tea",
            history: &history,
            message: "good night",
            role: Role::Companion,
            time_of_day: "night",
        });

        assert!(prompt.starts_with("Be sweet.\nMANDATORY RULES:"));
        assert!(prompt.contains("Current User ID: 77"));
        assert!(prompt.contains("to maintain continuity and avoid repeating mistakes.\n"));
        assert!(prompt.contains("- Never be rude"));
        assert!(prompt.contains("It's night. Context: likes tea"));
        assert!(prompt.contains("U: hi\nB: hello love\nU: miss you\nB: miss you more"));
        assert!(prompt.ends_with("Her message: good night"));
    }

    #[test]
    fn test_admin_prompt_uses_command_framing() {
        let document = MemoryDocument::default();
        let history = history();

        let prompt = build_prompt(&PromptContext {
            document: &document,
            owner_id: 1,
            user_memory: "state",
            history: &history,
            message: "status report",
            role: Role::Admin,
            time_of_day: "morning",
        });

        assert!(prompt.starts_with(DEFAULT_PERSONA));
        assert!(prompt.contains("Creator/Admin"));
        assert!(prompt.contains("Current date/time:"));
        assert!(prompt.ends_with("Command: status report"));
        assert!(!prompt.contains("miss you more"));
    }
}
