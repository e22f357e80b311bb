//! Heuristic message classification: emotional tone and smart commands.
//!
//! Both detectors are plain keyword matchers. They never look at history,
//! only at the text they are handed.

use crate::error::UnknownLabel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============ Tone Detection ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneLabel {
    Calm,
    Stressed,
    Excited,
    Sad,
}

impl ToneLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToneLabel::Calm => "calm",
            ToneLabel::Stressed => "stressed",
            ToneLabel::Excited => "excited",
            ToneLabel::Sad => "sad",
        }
    }
}

impl FromStr for ToneLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calm" => Ok(ToneLabel::Calm),
            "stressed" => Ok(ToneLabel::Stressed),
            "excited" => Ok(ToneLabel::Excited),
            "sad" => Ok(ToneLabel::Sad),
            _ => Err(UnknownLabel::new("tone", s)),
        }
    }
}

impl fmt::Display for ToneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const STRESSED_KEYWORDS: &[&str] = &[
    "stressed",
    "anxious",
    "worried",
    "overwhelmed",
    "panic",
    "help me",
    "can't handle",
    "too much",
    "deadline",
    "urgent",
    "ugh",
    "frustrated",
    "angry",
];

const EXCITED_KEYWORDS: &[&str] = &[
    "excited",
    "amazing",
    "awesome",
    "great news",
    "can't wait",
    "yay",
    "woohoo",
    "love it",
    "fantastic",
    "!!!",
    "omg",
    "incredible",
];

const SAD_KEYWORDS: &[&str] = &[
    "sad",
    "depressed",
    "lonely",
    "miss",
    "crying",
    "heartbroken",
    "lost",
    "feeling down",
    "hopeless",
    "tired of",
];

fn keyword_score(lower: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| lower.contains(*kw)).count()
}

/// Classify the emotional tone of a message.
///
/// Every keyword present counts once toward its mood. The highest count
/// wins; equal counts resolve stressed > excited > sad. No hits means calm.
pub fn detect_tone(text: &str) -> ToneLabel {
    let lower = text.to_lowercase();

    // Priority order matters: only a strictly higher count displaces an earlier entry
    let scored = [
        (ToneLabel::Stressed, keyword_score(&lower, STRESSED_KEYWORDS)),
        (ToneLabel::Excited, keyword_score(&lower, EXCITED_KEYWORDS)),
        (ToneLabel::Sad, keyword_score(&lower, SAD_KEYWORDS)),
    ];

    let mut best = (ToneLabel::Calm, 0);
    for (tone, score) in scored {
        if score > best.1 {
            best = (tone, score);
        }
    }
    best.0
}

// ============ Smart Commands ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Note,
    Idea,
    Reminder,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Note => "note",
            CommandKind::Idea => "idea",
            CommandKind::Reminder => "reminder",
        }
    }
}

/// A structured side effect requested by a trigger phrase in user text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedCommand {
    pub kind: CommandKind,
    pub extracted_content: String,
}

const NOTE_TRIGGERS: &[&str] = &["remember this", "note this", "save this note"];
const IDEA_TRIGGER: &str = "save idea";
const IDEA_PREFIX: &str = "idea:";
const REMINDER_TRIGGER: &str = "remind me";

/// Byte offset of the first ASCII case-insensitive match of `needle`.
///
/// Needles are ASCII, so any match starts and ends on a char boundary.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

fn starts_with_ignore_ascii_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

/// Text after the trigger ending at `end`, minus separators, or `message` as given.
fn content_after(text: &str, end: usize, message: &str) -> String {
    let rest = text[end..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim();
    if rest.is_empty() {
        message.to_string()
    } else {
        rest.to_string()
    }
}

/// Look for a smart command in a single user message.
///
/// Checked in order: note triggers, idea triggers, reminder trigger.
/// Triggers are matched on the trimmed text. Reminders, and commands with
/// nothing after the trigger, carry `message` exactly as given.
pub fn detect_smart_command(message: &str) -> Option<DetectedCommand> {
    let text = message.trim();

    let note_match = NOTE_TRIGGERS.iter().find_map(|trigger| {
        find_ignore_ascii_case(text, trigger).map(|start| start + trigger.len())
    });
    if let Some(end) = note_match {
        return Some(DetectedCommand {
            kind: CommandKind::Note,
            extracted_content: content_after(text, end, message),
        });
    }

    if let Some(start) = find_ignore_ascii_case(text, IDEA_TRIGGER) {
        return Some(DetectedCommand {
            kind: CommandKind::Idea,
            extracted_content: content_after(text, start + IDEA_TRIGGER.len(), message),
        });
    }
    if starts_with_ignore_ascii_case(text, IDEA_PREFIX) {
        return Some(DetectedCommand {
            kind: CommandKind::Idea,
            extracted_content: content_after(text, IDEA_PREFIX.len(), message),
        });
    }

    if find_ignore_ascii_case(text, REMINDER_TRIGGER).is_some() {
        return Some(DetectedCommand {
            kind: CommandKind::Reminder,
            extracted_content: message.to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_text_is_calm() {
        assert_eq!(detect_tone("let's grab lunch"), ToneLabel::Calm);
        assert_eq!(detect_tone(""), ToneLabel::Calm);
    }

    #[test]
    fn test_single_mood_wins() {
        assert_eq!(detect_tone("I'm so OVERWHELMED by this deadline"), ToneLabel::Stressed);
        assert_eq!(detect_tone("Great news, it's amazing"), ToneLabel::Excited);
        assert_eq!(detect_tone("feeling down and lonely"), ToneLabel::Sad);
    }

    #[test]
    fn test_ties_follow_priority() {
        assert_eq!(detect_tone("I'm stressed but also excited"), ToneLabel::Stressed);
        assert_eq!(detect_tone("excited yet sad"), ToneLabel::Excited);
    }

    #[test]
    fn test_higher_count_beats_priority() {
        // one stressed keyword against two excited ones
        assert_eq!(detect_tone("worried but this is awesome, yay"), ToneLabel::Excited);
    }

    #[test]
    fn test_keyword_counts_once() {
        // "sad sad sad" is still one sad hit, so the tie goes to stressed
        assert_eq!(detect_tone("sad sad sad, urgent"), ToneLabel::Stressed);
    }

    #[test]
    fn test_note_command() {
        assert_eq!(
            detect_smart_command("Remember this: buy milk"),
            Some(DetectedCommand {
                kind: CommandKind::Note,
                extracted_content: "buy milk".to_string(),
            })
        );
        let cmd = detect_smart_command("please save this note   dentist on friday").unwrap();
        assert_eq!(cmd.kind, CommandKind::Note);
        assert_eq!(cmd.extracted_content, "dentist on friday");
    }

    #[test]
    fn test_note_without_content_falls_back_to_full_text() {
        let cmd = detect_smart_command("note this:").unwrap();
        assert_eq!(cmd.kind, CommandKind::Note);
        assert_eq!(cmd.extracted_content, "note this:");
    }

    #[test]
    fn test_idea_command() {
        assert_eq!(
            detect_smart_command("idea: build a rocket"),
            Some(DetectedCommand {
                kind: CommandKind::Idea,
                extracted_content: "build a rocket".to_string(),
            })
        );
        let cmd = detect_smart_command("Save idea - solar kettle").unwrap();
        assert_eq!(cmd.kind, CommandKind::Idea);
        assert_eq!(cmd.extracted_content, "- solar kettle");
    }

    #[test]
    fn test_idea_prefix_must_lead() {
        assert_eq!(detect_smart_command("my idea: nothing"), None);
    }

    #[test]
    fn test_note_takes_precedence_over_reminder() {
        let cmd = detect_smart_command("remember this, remind me later").unwrap();
        assert_eq!(cmd.kind, CommandKind::Note);
    }

    #[test]
    fn test_reminder_keeps_full_text() {
        assert_eq!(
            detect_smart_command("remind me to call mom"),
            Some(DetectedCommand {
                kind: CommandKind::Reminder,
                extracted_content: "remind me to call mom".to_string(),
            })
        );
    }

    #[test]
    fn test_fallbacks_return_message_untrimmed() {
        let cmd = detect_smart_command("  remind me to stretch \n").unwrap();
        assert_eq!(cmd.kind, CommandKind::Reminder);
        assert_eq!(cmd.extracted_content, "  remind me to stretch \n");

        let cmd = detect_smart_command(" note this: ").unwrap();
        assert_eq!(cmd.kind, CommandKind::Note);
        assert_eq!(cmd.extracted_content, " note this: ");

        // extracted content itself is still trimmed
        let cmd = detect_smart_command("  idea:  tiny gardens  ").unwrap();
        assert_eq!(cmd.extracted_content, "tiny gardens");
    }

    #[test]
    fn test_no_command() {
        assert_eq!(detect_smart_command("how's the weather"), None);
    }

    #[test]
    fn test_non_ascii_text_before_trigger() {
        let cmd = detect_smart_command("Ünïcode, remember this: café at noon").unwrap();
        assert_eq!(cmd.extracted_content, "café at noon");
    }

    #[test]
    fn test_tone_label_round_trips_through_str() {
        for tone in [ToneLabel::Calm, ToneLabel::Stressed, ToneLabel::Excited, ToneLabel::Sad] {
            assert_eq!(tone.as_str().parse::<ToneLabel>(), Ok(tone));
        }
        assert_eq!("SAD".parse::<ToneLabel>(), Ok(ToneLabel::Sad));
        assert_eq!(
            "frustrated".parse::<ToneLabel>(),
            Err(UnknownLabel::new("tone", "frustrated"))
        );
    }
}
