//! Prompt construction and the fixed assistant replies.

use crate::models::{ChatMessage, Role};

/// Reply used when the moderation filter flags the user input.
pub const MODERATION_REFUSAL: &str = "I apologize if you're frustrated. I'm here to assist with questions about the help guide content. Could you please rephrase your question?";

/// Reply used when retrieval finds no relevant content.
pub const OUT_OF_SCOPE_REPLY: &str = "I apologize, but I can only assist with questions related to the help guide content. Could you please ask something related to that?";

/// Number of history messages sent with each completion request.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const SYSTEM_PREAMBLE: &str = "You are a professional and courteous assistant. Respond in a concise, polite, and professional manner, even if the user is frustrated or uses inappropriate language. Use the following information to answer the user's question accurately:";

const SYSTEM_CLOSING: &str = "If the question isn't related to the provided information, politely state that you can only assist with questions about the help guide content. Do not use or repeat any offensive language in your response.";

/// Reply used when a turn fails after moderation.
pub fn error_reply(detail: &str) -> String {
    format!(
        "I apologize, but an error occurred: {}. Please try again or ask a question related to the help guide.",
        detail
    )
}

/// Grounded system prompt: fixed instruction, retrieved context, fixed closing.
pub fn system_prompt(context: &str) -> String {
    format!("{}\n\n{}\n\n{}", SYSTEM_PREAMBLE, context, SYSTEM_CLOSING)
}

/// Build the request sequence: system prompt first, then the last `window`
/// history messages in chronological order.
///
/// The window is cut from the raw history before filtering, so it counts
/// messages, not turns. System messages and messages with empty content are
/// then left out.
pub fn build_request_messages(
    system: &str,
    history: &[ChatMessage],
    window: usize,
) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    let mut messages = Vec::with_capacity(window + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(
        history[start..]
            .iter()
            .filter(|m| m.role != Role::System && !m.content.trim().is_empty())
            .cloned(),
    );
    messages
}
