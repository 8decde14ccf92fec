//! System prompt assembly.
//!
//! The one piece of pure logic in the engine: a function from the
//! retrieved passages and this turn's tool outputs to the instruction
//! text sent ahead of the conversation on every model call. Nothing
//! here touches state, which is what keeps it trivially testable.

/// Build the system prompt for one model call.
///
/// Idempotent and side-effect-free: equal inputs always produce
/// byte-equal output.
pub fn build_system_prompt(retrieved_context: &[String], tool_outputs: &[String]) -> String {
    let context = retrieved_context.join("\n");
    let job_description = tool_outputs.join("\n");

    format!(
        "You are Nebula's AI assistant. Your goal is to help users get to know Nebula better. \
         You should be friendly, helpful, and informative. \
         Use the provided context from Nebula's documents and any job description to answer questions. \
         If you are asked to look up a job description from a URL, use the 'fetch_job_description_content' tool. \
         Do not make up information if it's not in the context or job description. \
         If you don't know the answer, say so. \
         Relevant context from Nebula's documents:\n{context}\n\n\
         Job description (if provided by user and fetched):\n{job_description}\n\n\
         Begin!"
    )
}
