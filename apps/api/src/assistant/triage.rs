//! Local red-flag screening applied to symptom text before trusting the model's urgency.

/// Phrases that always warrant emergency care, regardless of what the model says.
const RED_FLAGS: &[&str] = &[
    "chest pain",
    "chest pressure",
    "difficulty breathing",
    "shortness of breath",
    "can't breathe",
    "cannot breathe",
    "severe bleeding",
    "coughing blood",
    "vomiting blood",
    "loss of consciousness",
    "unconscious",
    "fainted",
    "seizure",
    "slurred speech",
    "face drooping",
    "sudden numbness",
    "sudden weakness",
    "worst headache",
    "suicidal",
    "overdose",
    "anaphylaxis",
    "throat swelling",
];

/// Red-flag phrases found in `text`, in table order.
pub fn detect_red_flags(text: &str) -> Vec<&'static str> {
    let normalized = normalize(text);
    RED_FLAGS
        .iter()
        .copied()
        .filter(|flag| normalized.contains(flag))
        .collect()
}

/// Lowercases, folds curly apostrophes and collapses whitespace.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
