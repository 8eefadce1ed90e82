// Health assistant: symptom analysis, diet recommendations, free-form chat.
// All model calls go through llm_client.

pub mod handlers;
pub mod prompts;
pub mod triage;
