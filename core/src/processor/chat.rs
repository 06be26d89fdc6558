use super::{malformed, OutcomeBuilder, ProcessError, ProcessOutcome, Processor};
use crate::document::{Document, Metadata, SourceKind};
use crate::loader::ChatTurn;

/// Speakers of a turn, in emission order
const SPEAKERS: [&str; 2] = ["user", "bot"];

/// Splits each chat turn into one document per speaker.
///
/// A turn counts as two records, one per side; an empty side is skipped on its own.
/// Documents are rendered as `"{speaker} ({timestamp}): {message}"` and identified
/// as `{message_id}_{speaker}`, or `msg_{turn_index}_{speaker}` when the turn has no id.
#[derive(Debug, Clone, Default)]
pub struct ChatProcessor;

impl ChatProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for ChatProcessor {
    type Record = ChatTurn;

    fn source_kind(&self) -> SourceKind {
        SourceKind::Chat
    }

    fn record_count(&self, batch: &[ChatTurn]) -> usize {
        batch.len() * SPEAKERS.len()
    }

    fn process(&self, batch: &[ChatTurn]) -> ProcessOutcome {
        let mut outcome = OutcomeBuilder::new(SourceKind::Chat);
        for (turn_index, turn) in batch.iter().enumerate() {
            for (side, (speaker, message)) in SPEAKERS.iter().zip([&turn.user, &turn.bot]).enumerate() {
                let index = turn_index * SPEAKERS.len() + side;
                if message.trim().is_empty() {
                    outcome.push(Err(ProcessError::MalformedRecord {
                        index,
                        reason: format!("empty {speaker} message"),
                    }));
                    continue;
                }

                let source_id = match &turn.message_id {
                    Some(id) if !id.trim().is_empty() => format!("{id}_{speaker}"),
                    _ => format!("msg_{turn_index}_{speaker}"),
                };
                let mut metadata = Metadata::new();
                metadata.insert("message_id".into(), source_id.clone().into());
                if let Some(turn_id) = &turn.message_id {
                    metadata.insert("turn_id".into(), turn_id.clone().into());
                }
                if let Some(user_id) = &turn.user_id {
                    metadata.insert("user_id".into(), user_id.clone().into());
                }
                metadata.insert("timestamp".into(), turn.timestamp.clone().into());
                metadata.insert("speaker".into(), (*speaker).into());
                metadata.insert("message".into(), message.clone().into());

                let text = format!("{speaker} ({}): {message}", turn.timestamp);
                outcome.push(
                    Document::new(SourceKind::Chat, source_id, text, metadata)
                        .map_err(malformed(index)),
                );
            }
        }
        outcome.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;

    fn turn(id: Option<&str>, user: &str, bot: &str) -> ChatTurn {
        ChatTurn {
            message_id: id.map(str::to_string),
            user_id: Some("u1".to_string()),
            timestamp: "2024-05-01T10:00:00".to_string(),
            user: user.to_string(),
            bot: bot.to_string(),
        }
    }

    #[test]
    fn test_turn_becomes_two_documents() {
        let outcome = ChatProcessor::new().process(&[turn(Some("u1_chat_0"), "Hi", "Hello!")]);
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.documents[0].text(), "user (2024-05-01T10:00:00): Hi");
        assert_eq!(outcome.documents[1].text(), "bot (2024-05-01T10:00:00): Hello!");
        assert_eq!(outcome.documents[0].source_id(), "u1_chat_0_user");
        assert_eq!(outcome.documents[1].source_id(), "u1_chat_0_bot");
        assert_eq!(
            outcome.documents[1].metadata().get("speaker"),
            Some(&MetadataValue::from("bot"))
        );
    }

    #[test]
    fn test_empty_side_is_skipped_alone() {
        let processor = ChatProcessor::new();
        let batch = [turn(Some("t"), "Hi", "")];
        let outcome = processor.process(&batch);
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].source_id(), "t_user");
        assert_eq!(outcome.skipped, 1);
        assert_eq!(
            outcome.documents.len() + outcome.skipped,
            processor.record_count(&batch)
        );
    }

    #[test]
    fn test_fallback_ids_are_unique() {
        let batch = [turn(None, "a", "b"), turn(None, "c", "   ")];
        let outcome = ChatProcessor::new().process(&batch);
        let ids: Vec<_> = outcome.documents.iter().map(Document::source_id).collect();
        assert_eq!(ids, vec!["msg_0_user", "msg_0_bot", "msg_1_user"]);
    }
}
