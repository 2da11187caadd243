use crate::clients::{Message, MessageRole, Part, ToolCallResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_assistant_text(&self) -> String {
        self.turns
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(Message::text)
            .unwrap_or_default()
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolCallResult> {
        self.turns
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .flat_map(|m| m.parts.iter())
            .filter_map(|part| match part {
                Part::ToolResult(result) => Some(result),
                _ => None,
            })
    }

    pub fn tool_turn_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ToolCallRequest;
    use serde_json::json;

    #[test]
    fn test_conversation_appends_in_order() {
        let mut conversation = Conversation::new();
        assert!(conversation.is_empty());

        let call = ToolCallRequest::new("random_number", json!({"command": "roll"}));
        conversation.push(Message::user("roll"));
        conversation.push(Message::assistant(vec![Part::ToolCall(call.clone())]));
        conversation.push(Message::tool_results(vec![ToolCallResult::success(
            &call,
            json!({"number": 2}),
        )]));
        conversation.push(Message::assistant(vec![Part::Text("You rolled 2".to_string())]));

        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.turns()[0].role, MessageRole::User);
        assert_eq!(conversation.tool_turn_count(), 1);
        assert_eq!(conversation.tool_results().count(), 1);
        assert_eq!(conversation.last_assistant_text(), "You rolled 2");
    }

    #[test]
    fn test_last_assistant_text_empty_without_replies() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hello"));
        assert_eq!(conversation.last_assistant_text(), "");
    }
}
