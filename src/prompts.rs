// Persona prompt for VIONA, rendered per request from the user's profile

use crate::db::UserProfile;
use crate::error::UnknownLabel;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonePreference {
    #[default]
    Supportive,
    Professional,
    Casual,
    Motivational,
}

impl TonePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            TonePreference::Supportive => "supportive",
            TonePreference::Professional => "professional",
            TonePreference::Casual => "casual",
            TonePreference::Motivational => "motivational",
        }
    }
}

impl FromStr for TonePreference {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supportive" => Ok(TonePreference::Supportive),
            "professional" => Ok(TonePreference::Professional),
            "casual" => Ok(TonePreference::Casual),
            "motivational" => Ok(TonePreference::Motivational),
            _ => Err(UnknownLabel::new("tone preference", s)),
        }
    }
}

/// Sent after the system prompt so the model opens the synthetic exchange.
pub const PROMPT_HANDOFF: &str = "\n\nPlease acknowledge and begin.";

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Render the persona prompt for a profile.
///
/// Pure string construction, so identical inputs always render identical bytes.
pub fn build_system_prompt(profile: Option<&UserProfile>, tone: Option<TonePreference>) -> String {
    let name = non_blank(profile.and_then(|p| p.full_name.as_deref()));
    let goals = non_blank(profile.and_then(|p| p.goals.as_deref()));
    let tone = tone.unwrap_or_default();

    format!(
        r#"You are VIONA — a warm, intelligent, and empathetic personal AI assistant.

PERSONALITY TRAITS:
- You're supportive yet honest. You celebrate wins and gently challenge bad ideas.
- You speak naturally, like a trusted friend who happens to be brilliant.
- You use the user's name ({friendly_name}) occasionally to be personal.
- You remember context from the conversation and reference it.
- You NEVER say you're "just an AI" — you're VIONA, their dedicated assistant.

USER PROFILE:
- Name: {name}
- Goals: {goals}
- Preferred tone: {tone}

TONE GUIDELINES (match to preference "{tone}"):
- supportive: Encouraging, warm, uses emojis sparingly ✨
- professional: Clear, structured, formal but approachable
- casual: Friendly, uses humor, relaxed language
- motivational: Energetic, pump-up energy, action-oriented 🔥

CAPABILITIES — you can help with:
- Brainstorming ideas and creative thinking
- Decision-making (pros/cons analysis)
- Drafting messages, emails, plans
- Step-by-step reasoning and problem solving
- Emotional support and motivation
- Organizing thoughts and priorities

SPECIAL COMMANDS (detect and respond accordingly):
- If user says "remember this" or "note this" → Acknowledge and confirm you'll save it
- If user says "save idea" or "idea:" → Acknowledge the idea being saved
- If user says "remind me" → Ask for when, and confirm the reminder

TONE DETECTION:
- Analyze the user's message tone (calm, stressed, excited, sad, frustrated)
- Adapt your response energy to match or uplift their mood
- If stressed: be calming and reassuring
- If excited: match their energy
- If sad: be gentle and supportive

Keep responses concise but helpful. Use bullet points for lists. Be actionable."#,
        friendly_name = name.unwrap_or("friend"),
        name = name.unwrap_or("Not set"),
        goals = goals.unwrap_or("Not shared yet"),
        tone = tone.as_str(),
    )
}

/// The model's half of the synthetic opening exchange.
pub fn build_greeting(profile: Option<&UserProfile>) -> String {
    let name = non_blank(profile.and_then(|p| p.full_name.as_deref())).unwrap_or("there");
    format!(
        "Hey {}! I'm VIONA, your personal AI assistant. I'm here and ready to help. What's on your mind? 😊",
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: Option<&str>, goals: Option<&str>) -> UserProfile {
        UserProfile {
            user_id: "user-1".to_string(),
            full_name: name.map(str::to_string),
            goals: goals.map(str::to_string),
            tone_preference: None,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_prompt_embeds_profile() {
        let p = profile(Some("Ada"), Some("Ship the compiler"));
        let prompt = build_system_prompt(Some(&p), Some(TonePreference::Casual));

        assert!(prompt.contains("- Name: Ada"));
        assert!(prompt.contains("user's name (Ada)"));
        assert!(prompt.contains("- Goals: Ship the compiler"));
        assert!(prompt.contains("- Preferred tone: casual"));
        assert!(prompt.contains("match to preference \"casual\""));
    }

    #[test]
    fn test_prompt_placeholders_without_profile() {
        let prompt = build_system_prompt(None, None);

        assert!(prompt.contains("- Name: Not set"));
        assert!(prompt.contains("user's name (friend)"));
        assert!(prompt.contains("- Goals: Not shared yet"));
        assert!(prompt.contains("- Preferred tone: supportive"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_blank_fields_use_placeholders() {
        let p = profile(Some("   "), Some(""));
        let prompt = build_system_prompt(Some(&p), None);
        assert!(prompt.contains("- Name: Not set"));
        assert!(prompt.contains("- Goals: Not shared yet"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let p = profile(Some("Ada"), None);
        let first = build_system_prompt(Some(&p), Some(TonePreference::Motivational));
        let second = build_system_prompt(Some(&p), Some(TonePreference::Motivational));
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_greeting() {
        assert!(build_greeting(None).starts_with("Hey there!"));
        let p = profile(Some("Ada"), None);
        assert!(build_greeting(Some(&p)).starts_with("Hey Ada!"));
    }

    #[test]
    fn test_tone_preference_parsing() {
        assert_eq!(" Casual ".parse::<TonePreference>(), Ok(TonePreference::Casual));
        assert!("grumpy".parse::<TonePreference>().is_err());
        assert_eq!(TonePreference::default(), TonePreference::Supportive);
    }
}
