//! Axum route handlers for the health assistant.
//!
//! Each endpoint fills a static prompt template with the caller's text and
//! forwards it to the model. Responses always carry the medical disclaimer.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::assistant::prompts::{
    CHAT_SYSTEM, DIET_PROMPT_TEMPLATE, DIET_SYSTEM, SYMPTOM_PROMPT_TEMPLATE, SYMPTOM_SYSTEM,
};
use crate::assistant::triage::detect_red_flags;
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, MEDICAL_DISCLAIMER, MEDICAL_SAFETY_INSTRUCTION};
use crate::llm_client::{LlmError, Role, Turn};
use crate::models::user::UserRow;
use crate::state::AppState;
use crate::users::repo::UserRepo;
use crate::users::validation::age_on;

pub const MAX_INPUT_CHARS: usize = 4000;
const MAX_SHORT_FIELD_CHARS: usize = 200;
pub const MAX_HISTORY_TURNS: usize = 20;
const NOT_PROVIDED: &str = "not provided";
const EMERGENCY_ACTION: &str =
    "Seek emergency medical care immediately or call your local emergency number.";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SymptomRequest {
    pub symptoms: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Moderate,
    High,
    Emergency,
}

impl<'de> Deserialize<'de> for Urgency {
    /// Lenient: models vary casing; anything unrecognized reads as moderate.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_lowercase().as_str() {
            "low" => Urgency::Low,
            "high" => Urgency::High,
            "emergency" => Urgency::Emergency,
            _ => Urgency::Moderate,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PossibleCondition {
    pub name: String,
    pub likelihood: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomAnalysis {
    #[serde(default)]
    pub possible_conditions: Vec<PossibleCondition>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    pub urgency: Urgency,
    #[serde(default)]
    pub see_doctor: bool,
}

#[derive(Debug, Serialize)]
pub struct SymptomResponse {
    #[serde(flatten)]
    pub analysis: SymptomAnalysis,
    pub red_flags: Vec<String>,
    pub disclaimer: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct DietRequest {
    pub goal: String,
    pub preferences: Option<String>,
    pub restrictions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietPlan {
    pub summary: String,
    pub daily_calories: Option<u32>,
    #[serde(default)]
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub foods_to_avoid: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DietResponse {
    #[serde(flatten)]
    pub plan: DietPlan,
    pub disclaimer: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub disclaimer: &'static str,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Trims and bounds required free text.
fn require_text<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<String, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(require_text(field, v, max)?.to_string()),
        None => Ok(NOT_PROVIDED.to_string()),
    }
}

fn system_prompt(base: &str, json: bool) -> String {
    if json {
        format!("{base} {MEDICAL_SAFETY_INSTRUCTION} {JSON_ONLY_SYSTEM}")
    } else {
        format!("{base} {MEDICAL_SAFETY_INSTRUCTION}")
    }
}

fn llm_error(context: &str, e: LlmError) -> AppError {
    AppError::Llm(format!("{context}: {e}"))
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none reported".to_string()
    } else {
        items.join(", ")
    }
}

/// Replaces each `{name}` placeholder in one left-to-right pass. Substituted
/// text is never rescanned, so user input cannot expand other placeholders.
/// Braces that do not name a placeholder (the JSON schema) are copied as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Built locally when red flags matched but the model gave no usable answer.
pub fn emergency_fallback() -> SymptomAnalysis {
    SymptomAnalysis {
        possible_conditions: Vec::new(),
        recommended_actions: vec![EMERGENCY_ACTION.to_string()],
        urgency: Urgency::Emergency,
        see_doctor: true,
    }
}

/// Applies local red-flag escalation on top of the model's assessment.
pub fn escalate(mut analysis: SymptomAnalysis, red_flags: &[&str]) -> SymptomAnalysis {
    if !red_flags.is_empty() {
        analysis.urgency = Urgency::Emergency;
        analysis.see_doctor = true;
        if !analysis.recommended_actions.iter().any(|a| a == EMERGENCY_ACTION) {
            analysis
                .recommended_actions
                .insert(0, EMERGENCY_ACTION.to_string());
        }
    } else if analysis.urgency >= Urgency::High {
        analysis.see_doctor = true;
    }
    analysis
}

/// Fills the diet template from the request and stored profile.
pub fn build_diet_prompt(
    goal: &str,
    preferences: &str,
    restrictions: &str,
    profile: &UserRow,
    today: chrono::NaiveDate,
) -> String {
    let age = profile
        .date_of_birth
        .map(|dob| age_on(dob, today).to_string())
        .unwrap_or_else(|| NOT_PROVIDED.to_string());
    let height = profile
        .height_cm
        .map(|h| format!("{h:.0} cm"))
        .unwrap_or_else(|| NOT_PROVIDED.to_string());
    let weight = profile
        .weight_kg
        .map(|w| format!("{w:.1} kg"))
        .unwrap_or_else(|| NOT_PROVIDED.to_string());

    let allergies = list_or_none(&profile.allergies);
    let conditions = list_or_none(&profile.chronic_conditions);
    fill_template(
        DIET_PROMPT_TEMPLATE,
        &[
            ("age", age.as_str()),
            ("height", height.as_str()),
            ("weight", weight.as_str()),
            ("allergies", allergies.as_str()),
            ("conditions", conditions.as_str()),
            ("preferences", preferences),
            ("restrictions", restrictions),
            ("goal", goal),
        ],
    )
}

/// Ensures every profile allergy appears in `foods_to_avoid`.
pub fn merge_allergies(mut plan: DietPlan, allergies: &[String]) -> DietPlan {
    for allergy in allergies {
        let present = plan
            .foods_to_avoid
            .iter()
            .any(|f| f.to_lowercase().contains(&allergy.to_lowercase()));
        if !present {
            plan.foods_to_avoid.push(allergy.clone());
        }
    }
    plan
}

/// Keeps the most recent `MAX_HISTORY_TURNS` non-empty turns.
fn trim_history(history: &[ChatMessage]) -> &[ChatMessage] {
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    &history[start..]
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/assistant/symptoms
pub async fn handle_symptoms(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<SymptomRequest>,
) -> Result<Json<SymptomResponse>, AppError> {
    let symptoms = require_text("symptoms", &req.symptoms, MAX_INPUT_CHARS)?;
    let gender = optional_text("gender", req.gender.as_deref(), MAX_SHORT_FIELD_CHARS)?;
    let duration = optional_text("duration", req.duration.as_deref(), MAX_SHORT_FIELD_CHARS)?;
    let age = match req.age {
        Some(age) if age <= 130 => age.to_string(),
        Some(_) => return Err(AppError::Validation("age is not plausible".to_string())),
        None => NOT_PROVIDED.to_string(),
    };

    let prompt = fill_template(
        SYMPTOM_PROMPT_TEMPLATE,
        &[
            ("age", age.as_str()),
            ("gender", gender.as_str()),
            ("duration", duration.as_str()),
            ("symptoms", symptoms),
        ],
    );

    // Screened before the model call so an outage or a safety block
    // cannot suppress the escalation.
    let red_flags = detect_red_flags(symptoms);
    if !red_flags.is_empty() {
        tracing::warn!("Symptom request matched red flags: {:?}", red_flags);
    }

    let analysis = match state
        .llm
        .call_json::<SymptomAnalysis>(&prompt, &system_prompt(SYMPTOM_SYSTEM, true))
        .await
    {
        Ok(analysis) => escalate(analysis, &red_flags),
        Err(e) if !red_flags.is_empty() => {
            tracing::warn!("Symptom analysis failed, answering with local escalation: {e}");
            emergency_fallback()
        }
        Err(e) => return Err(llm_error("Symptom analysis failed", e)),
    };

    Ok(Json(SymptomResponse {
        analysis,
        red_flags: red_flags.into_iter().map(String::from).collect(),
        disclaimer: MEDICAL_DISCLAIMER,
    }))
}

/// POST /api/v1/assistant/diet
pub async fn handle_diet(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<DietRequest>,
) -> Result<Json<DietResponse>, AppError> {
    let goal = require_text("goal", &req.goal, MAX_INPUT_CHARS)?;
    let preferences = optional_text("preferences", req.preferences.as_deref(), MAX_INPUT_CHARS)?;
    let restrictions =
        optional_text("restrictions", req.restrictions.as_deref(), MAX_INPUT_CHARS)?;

    let profile = UserRepo::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let prompt = build_diet_prompt(
        goal,
        &preferences,
        &restrictions,
        &profile,
        Utc::now().date_naive(),
    );

    let plan: DietPlan = state
        .llm
        .call_json(&prompt, &system_prompt(DIET_SYSTEM, true))
        .await
        .map_err(|e| llm_error("Diet recommendation failed", e))?;

    Ok(Json(DietResponse {
        plan: merge_allergies(plan, &profile.allergies),
        disclaimer: MEDICAL_DISCLAIMER,
    }))
}

/// POST /api/v1/assistant/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = require_text("message", &req.message, MAX_INPUT_CHARS)?;

    let history = trim_history(&req.history);
    let mut turns: Vec<Turn<'_>> = Vec::with_capacity(history.len() + 1);
    for past in history {
        let text = past.content.trim();
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > MAX_INPUT_CHARS {
            return Err(AppError::Validation(format!(
                "history entries must be at most {MAX_INPUT_CHARS} characters"
            )));
        }
        let role = match past.role {
            ChatRole::User => Role::User,
            ChatRole::Assistant => Role::Model,
        };
        turns.push(Turn { role, text });
    }
    turns.push(Turn {
        role: Role::User,
        text: message,
    });

    let reply = state
        .llm
        .converse(&turns, &system_prompt(CHAT_SYSTEM, false))
        .await
        .map_err(|e| llm_error("Chat failed", e))?;

    Ok(Json(ChatResponse {
        reply: reply.trim().to_string(),
        disclaimer: MEDICAL_DISCLAIMER,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn profile() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            email: "p@example.com".into(),
            password_hash: None,
            google_sub: None,
            name: "Pat".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 1, 1),
            gender: None,
            phone: None,
            blood_group: None,
            height_cm: Some(172.0),
            weight_kg: None,
            allergies: vec!["Peanuts".into()],
            chronic_conditions: vec![],
            emergency_contact: None,
            avatar_key: None,
            avatar_content_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn analysis(urgency: Urgency) -> SymptomAnalysis {
        SymptomAnalysis {
            possible_conditions: vec![],
            recommended_actions: vec!["Rest".into()],
            urgency,
            see_doctor: false,
        }
    }

    #[test]
    fn test_red_flags_force_emergency() {
        let escalated = escalate(analysis(Urgency::Low), &["chest pain"]);
        assert_eq!(escalated.urgency, Urgency::Emergency);
        assert!(escalated.see_doctor);
        assert!(escalated.recommended_actions[0].contains("emergency"));
    }

    #[test]
    fn test_high_urgency_sets_see_doctor() {
        let result = escalate(analysis(Urgency::High), &[]);
        assert_eq!(result.urgency, Urgency::High);
        assert!(result.see_doctor);
        let result = escalate(analysis(Urgency::Low), &[]);
        assert!(!result.see_doctor);
    }

    #[test]
    fn test_urgency_lenient_parse() {
        let a: SymptomAnalysis =
            serde_json::from_str(r#"{"urgency":"EMERGENCY","possible_conditions":[]}"#).unwrap();
        assert_eq!(a.urgency, Urgency::Emergency);
        let a: SymptomAnalysis = serde_json::from_str(r#"{"urgency":"unclear"}"#).unwrap();
        assert_eq!(a.urgency, Urgency::Moderate);
    }

    #[test]
    fn test_diet_prompt_includes_profile_facts() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let prompt = build_diet_prompt("lose 5 kg", "vegetarian", NOT_PROVIDED, &profile(), today);
        assert!(prompt.contains("- Age: 44"));
        assert!(prompt.contains("- Height: 172 cm"));
        assert!(prompt.contains("- Weight: not provided"));
        assert!(prompt.contains("Known allergies: Peanuts"));
        assert!(prompt.contains("Chronic conditions: none reported"));
        assert!(prompt.contains("lose 5 kg"));
        assert!(!prompt.contains("{goal}"));
    }

    #[test]
    fn test_goal_placeholders_not_expanded() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let prompt = build_diet_prompt("my {age} is secret", "x", "y", &profile(), today);
        assert!(prompt.contains("my {age} is secret"));
    }

    #[test]
    fn test_user_text_cannot_expand_other_placeholders() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let prompt = build_diet_prompt(
            "eat {restrictions}",
            "{goal} and {age}",
            "none",
            &profile(),
            today,
        );
        assert!(prompt.contains("eat {restrictions}"));
        assert!(prompt.contains("Dietary preferences: {goal} and {age}"));

        let symptoms = fill_template(
            SYMPTOM_PROMPT_TEMPLATE,
            &[
                ("age", "30"),
                ("gender", "{symptoms}"),
                ("duration", "2 days"),
                ("symptoms", "cough"),
            ],
        );
        assert!(symptoms.contains("- Gender: {symptoms}"));
        assert!(symptoms.contains("\"see_doctor\": true | false"));
    }

    #[test]
    fn test_fill_template_leaves_unknown_braces() {
        assert_eq!(
            fill_template("{a} {b} {\"x\": 1} {", &[("a", "1")]),
            "1 {b} {\"x\": 1} {"
        );
    }

    #[test]
    fn test_emergency_fallback_without_model() {
        let fallback = emergency_fallback();
        assert_eq!(fallback.urgency, Urgency::Emergency);
        assert!(fallback.see_doctor);
        assert!(fallback.possible_conditions.is_empty());
        assert_eq!(fallback.recommended_actions.len(), 1);
        assert!(fallback.recommended_actions[0].contains("emergency"));
    }

    #[test]
    fn test_merge_allergies() {
        let plan = DietPlan {
            summary: "Balanced".into(),
            daily_calories: None,
            meals: vec![],
            foods_to_avoid: vec!["Fried food".into()],
            tips: vec![],
        };
        let merged = merge_allergies(plan, &["Shellfish".into()]);
        assert_eq!(merged.foods_to_avoid, vec!["Fried food", "Shellfish"]);

        let plan = DietPlan {
            summary: "Balanced".into(),
            daily_calories: None,
            meals: vec![],
            foods_to_avoid: vec!["peanuts and peanut butter".into()],
            tips: vec![],
        };
        assert_eq!(merge_allergies(plan, &["Peanuts".into()]).foods_to_avoid.len(), 1);
    }

    #[test]
    fn test_trim_history_keeps_latest() {
        let history: Vec<ChatMessage> = (0..25)
            .map(|i| ChatMessage {
                role: ChatRole::User,
                content: format!("m{i}"),
            })
            .collect();
        let kept = trim_history(&history);
        assert_eq!(kept.len(), MAX_HISTORY_TURNS);
        assert_eq!(kept[0].content, "m5");
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("symptoms", "   ", 10).is_err());
        assert!(require_text("symptoms", "abcdefghijk", 10).is_err());
        assert_eq!(require_text("symptoms", "  cough ", 10).unwrap(), "cough");
    }
}
