//! Prompt assembly for the review completion call.

use crate::context::ReviewContext;
use crate::knowledge::CodebaseKnowledge;

/// System prompt for code review.
pub fn get_system_prompt() -> String {
    include_str!("../prompt.txt").to_string()
}

/// Build the user prompt from the review context and codebase knowledge.
///
/// `focus` narrows the review to one area (e.g. "security") when the
/// triggering command asked for it.
pub fn create_user_prompt(
    context: &ReviewContext,
    knowledge: &CodebaseKnowledge,
    focus: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Pull request #{} in {}: {}\n",
        context.pr_number, context.repo, context.title
    );

    if let Some(body) = &context.body {
        if !body.trim().is_empty() {
            prompt.push_str("\nDESCRIPTION:\n");
            prompt.push_str(body);
            prompt.push('\n');
        }
    }

    if let Some(focus) = focus {
        prompt.push_str(&format!(
            "\nFOCUS: concentrate this review on {} aspects of the change.\n",
            focus
        ));
    }

    if !context.linked_tickets.is_empty() {
        prompt.push_str("\nLINKED TICKETS:\n");
        for ticket in &context.linked_tickets {
            match &ticket.summary {
                Some(summary) => prompt.push_str(&format!("- {}: {}\n", ticket.key, summary)),
                None => prompt.push_str(&format!("- {}\n", ticket.key)),
            }
        }
    }

    prompt.push_str("\nCHANGE SUMMARY:\n");
    prompt.push_str(&context.diff_summary);
    prompt.push('\n');

    if !knowledge.is_empty() {
        prompt.push_str("\nCODEBASE KNOWLEDGE (from related files):\n");
        if !knowledge.functions.is_empty() {
            prompt.push_str(&format!("Functions: {}\n", knowledge.functions.join(", ")));
        }
        if !knowledge.constants.is_empty() {
            prompt.push_str(&format!("Constants: {}\n", knowledge.constants.join(", ")));
        }
        if !knowledge.patterns.is_empty() {
            prompt.push_str(&format!("Conventions: {}\n", knowledge.patterns.join(", ")));
        }
        if !knowledge.related_files.is_empty() {
            prompt.push_str(&format!(
                "Related files: {}\n",
                knowledge.related_files.join(", ")
            ));
        }
    }

    prompt.push_str("\nDIFF BEGINS:\n");
    for file in &context.changed_files {
        if let Some(patch) = &file.patch {
            prompt.push_str(&format!("\n=== {} ===\n{}\n", file.path, patch));
        }
    }
    prompt.push_str("DIFF ENDS\n");

    prompt
}
