//! Generation Prompts
//!
//! Builds the system and user prompts for each kind of provider call:
//! the initial draft, the premium refinement pass, and targeted
//! revisions driven by quality or continuity issues.

use crate::generation::context::GenerationContext;

/// System instruction for the initial draft pass
pub fn draft_system_prompt() -> String {
    "You are an accomplished novelist writing a chapter of a book. \
     Write immersive, polished prose that follows the provided context exactly: \
     the point of view, tense, tone, character voices, and required events. \
     Write only the chapter text itself, with no headings, notes, or commentary."
        .to_string()
}

/// User prompt for the initial draft pass
pub fn draft_user_prompt(context: &GenerationContext) -> String {
    format!(
        "{}Write chapter {} (\"{}\") in full. Aim for approximately {} words. \
         Begin the chapter now.",
        context.render_prompt(),
        context.chapter_number,
        context.chapter_title,
        context.target_word_count,
    )
}

/// System instruction for the premium refinement pass. Editing mode:
/// improve the draft without inventing new plot.
pub fn refinement_system_prompt() -> String {
    "You are a meticulous line editor revising a novel chapter draft. \
     Improve prose rhythm, word choice, dialogue, and pacing while preserving \
     the draft's plot, events, character actions, and point of view exactly. \
     Do not add new scenes or remove required events. \
     Return only the revised chapter text."
        .to_string()
}

/// User prompt for the refinement pass, carrying the draft
pub fn refinement_user_prompt(context: &GenerationContext, draft: &str) -> String {
    format!(
        "{}Here is the draft of chapter {} (\"{}\"):\n\n{}\n\n\
         Revise the draft into its strongest version, keeping its plot and events intact. \
         Target length remains approximately {} words.",
        context.render_prompt(),
        context.chapter_number,
        context.chapter_title,
        draft,
        context.target_word_count,
    )
}

/// User prompt for a revision attempt driven by ranked issues.
///
/// `preserve` names elements the revision must carry over verbatim,
/// such as specific dialogue or key scenes.
pub fn revision_user_prompt(
    context: &GenerationContext,
    previous_content: &str,
    instructions: &[String],
    preserve: &[String],
) -> String {
    let mut prompt = context.render_prompt();
    prompt.push_str(&format!(
        "The previous version of chapter {} (\"{}\") follows:\n\n{}\n\n",
        context.chapter_number, context.chapter_title, previous_content,
    ));
    prompt.push_str("Rewrite the chapter, addressing every instruction below:\n");
    for instruction in instructions {
        prompt.push_str("- ");
        prompt.push_str(instruction);
        prompt.push('\n');
    }
    if !preserve.is_empty() {
        prompt.push_str("\nPreserve these elements unchanged:\n");
        for element in preserve {
            prompt.push_str("- ");
            prompt.push_str(element);
            prompt.push('\n');
        }
    }
    prompt.push_str(&format!(
        "\nTarget length remains approximately {} words.",
        context.target_word_count
    ));
    prompt
}

// =============================================================================
// Tests
// =============================================================================
