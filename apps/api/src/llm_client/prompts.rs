// Shared prompt fragments.
// Each feature that needs LLM calls defines its own prompts.rs alongside it.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Safety framing shared by every health-related prompt.
pub const MEDICAL_SAFETY_INSTRUCTION: &str = "\
    You are not a doctor and must never present a diagnosis as certain. \
    Never prescribe medication doses. \
    If anything described could be an emergency, say so plainly and tell the user \
    to contact emergency services.";

/// Disclaimer attached to every assistant response.
pub const MEDICAL_DISCLAIMER: &str = "This information is generated by an AI model for \
    general guidance only and is not a substitute for professional medical advice, \
    diagnosis, or treatment. Always consult a qualified healthcare provider.";
