use super::{malformed, OutcomeBuilder, ProcessError, ProcessOutcome, Processor};
use crate::document::{Document, SourceKind};
use crate::loader::{positive, present, Profile};

const UNKNOWN: &str = "unknown";

/// One document per user profile.
///
/// The text lists only the fields that are set, in a fixed order:
/// `User profile for Ana. Age: 31 years. Weight: 64.5kg. Goal: lose weight`.
#[derive(Debug, Clone, Default)]
pub struct ProfileProcessor;

impl ProfileProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn render(profile: &Profile) -> String {
    let who = present(&profile.name)
        .or_else(|| present(&profile.user_id))
        .unwrap_or(UNKNOWN);
    let mut parts = vec![format!("User profile for {who}")];

    if let Some(age) = profile.age.filter(|a| *a > 0) {
        parts.push(format!("Age: {age} years"));
    }
    if let Some(weight) = positive(profile.weight) {
        parts.push(format!("Weight: {weight}kg"));
    }
    if let Some(height) = positive(profile.height) {
        parts.push(format!("Height: {height}cm"));
    }
    if let Some(goal) = present(&profile.goal) {
        parts.push(format!("Goal: {goal}"));
    }
    if let Some(level) = present(&profile.activity_level) {
        parts.push(format!("Activity level: {level}"));
    }
    parts.join(". ")
}

impl Processor for ProfileProcessor {
    type Record = Profile;

    fn source_kind(&self) -> SourceKind {
        SourceKind::Profile
    }

    fn process(&self, batch: &[Profile]) -> ProcessOutcome {
        let mut outcome = OutcomeBuilder::new(SourceKind::Profile);
        for (index, profile) in batch.iter().enumerate() {
            if profile.is_empty() {
                outcome.push(Err(ProcessError::MalformedRecord {
                    index,
                    reason: "empty profile".to_string(),
                }));
                continue;
            }
            let user_id = present(&profile.user_id).unwrap_or(UNKNOWN);
            let document = Document::new(
                SourceKind::Profile,
                format!("profile_{user_id}"),
                render(profile),
                profile.to_metadata(),
            )
            .map_err(malformed(index));
            outcome.push(document);
        }
        outcome.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;

    fn ana() -> Profile {
        Profile {
            user_id: Some("u1".to_string()),
            name: Some("Ana".to_string()),
            age: Some(31),
            weight: Some(64.5),
            height: Some(168.0),
            goal: Some("lose weight".to_string()),
            activity_level: Some("moderate".to_string()),
            ..Profile::default()
        }
    }

    #[test]
    fn test_full_profile_text() {
        let outcome = ProfileProcessor::new().process(&[ana()]);
        let doc = &outcome.documents[0];
        assert_eq!(
            doc.text(),
            "User profile for Ana. Age: 31 years. Weight: 64.5kg. Height: 168cm. Goal: lose weight. Activity level: moderate"
        );
        assert_eq!(doc.source_id(), "profile_u1");
        assert_eq!(doc.metadata().get("goal"), Some(&MetadataValue::from("lose weight")));
    }

    #[test]
    fn test_only_present_fields_are_rendered() {
        let profile = Profile {
            user_id: Some("u2".to_string()),
            goal: Some("gain muscle".to_string()),
            ..Profile::default()
        };
        let outcome = ProfileProcessor::new().process(&[profile]);
        assert_eq!(
            outcome.documents[0].text(),
            "User profile for u2. Goal: gain muscle"
        );
    }

    #[test]
    fn test_anonymous_profile_falls_back_to_unknown() {
        let profile = Profile {
            age: Some(40),
            ..Profile::default()
        };
        let outcome = ProfileProcessor::new().process(&[profile]);
        let doc = &outcome.documents[0];
        assert_eq!(doc.source_id(), "profile_unknown");
        assert_eq!(doc.text(), "User profile for unknown. Age: 40 years");
    }

    #[test]
    fn test_empty_and_duplicate_profiles_are_skipped() {
        let anonymous = Profile {
            age: Some(40),
            ..Profile::default()
        };
        let batch = vec![ana(), Profile::default(), anonymous.clone(), anonymous, ana()];
        let outcome = ProfileProcessor::new().process(&batch);
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.documents.len() + outcome.skipped, batch.len());
    }

    #[test]
    fn test_blank_and_zero_fields_count_as_empty() {
        let blank = Profile {
            name: Some(String::new()),
            goal: Some("   ".to_string()),
            age: Some(0),
            weight: Some(0.0),
            ..Profile::default()
        };
        assert!(blank.is_empty());
        let outcome = ProfileProcessor::new().process(&[blank]);
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.skipped, 1);
    }
}
