//! Survey state machine — tracks which phase a conversation is in.

use serde::{Deserialize, Serialize};

use crate::error::SurveyError;
use crate::llm::ChatMessage;

/// The phases of the survey conversation.
///
/// Progresses linearly: AwaitingRating → AwaitingReason → Completed.
/// AwaitingRating loops on an invalid rating; Completed loops forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyPhase {
    AwaitingRating,
    AwaitingReason,
    Completed,
}

impl SurveyPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SurveyPhase) -> bool {
        use SurveyPhase::*;
        matches!(
            (self, target),
            (AwaitingRating, AwaitingRating)
                | (AwaitingRating, AwaitingReason)
                | (AwaitingReason, Completed)
                | (Completed, Completed)
        )
    }

    /// Whether the survey is over. Terminal phases still answer messages.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for SurveyPhase {
    fn default() -> Self {
        Self::AwaitingRating
    }
}

impl std::fmt::Display for SurveyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingRating => "awaiting_rating",
            Self::AwaitingReason => "awaiting_reason",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Per-session survey state, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub phase: SurveyPhase,
    /// Append-only transcript of user and assistant messages.
    pub history: Vec<ChatMessage>,
    /// The rating message as the user typed it, once accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rating: Option<String>,
}

impl ConversationState {
    /// Move to `target`, rejecting skips and backward moves.
    pub fn transition_to(&mut self, target: SurveyPhase) -> Result<(), SurveyError> {
        if !self.phase.can_transition_to(target) {
            return Err(SurveyError::InvalidTransition {
                from: self.phase,
                to: target,
            });
        }
        self.phase = target;
        Ok(())
    }

    /// Append the opening assistant message.
    pub fn record_greeting(&mut self, reply: &str) {
        self.history.push(ChatMessage::assistant(reply));
    }

    /// Append one user message and the assistant's answer.
    pub fn record_turn(&mut self, user: &str, reply: &str) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn valid_transitions() {
        use SurveyPhase::*;
        let transitions = [
            (AwaitingRating, AwaitingRating),
            (AwaitingRating, AwaitingReason),
            (AwaitingReason, Completed),
            (Completed, Completed),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use SurveyPhase::*;
        // Skip
        assert!(!AwaitingRating.can_transition_to(Completed));
        // Backward
        assert!(!AwaitingReason.can_transition_to(AwaitingRating));
        assert!(!Completed.can_transition_to(AwaitingReason));
        // Reason phase never loops
        assert!(!AwaitingReason.can_transition_to(AwaitingReason));
    }

    #[test]
    fn transition_to_rejects_skip_and_keeps_phase() {
        let mut state = ConversationState::default();
        let err = state.transition_to(SurveyPhase::Completed).unwrap_err();
        assert!(matches!(
            err,
            SurveyError::InvalidTransition {
                from: SurveyPhase::AwaitingRating,
                to: SurveyPhase::Completed
            }
        ));
        assert_eq!(state.phase, SurveyPhase::AwaitingRating);
    }

    #[test]
    fn is_terminal() {
        assert!(SurveyPhase::Completed.is_terminal());
        assert!(!SurveyPhase::AwaitingRating.is_terminal());
        assert!(!SurveyPhase::AwaitingReason.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        use SurveyPhase::*;
        for phase in [AwaitingRating, AwaitingReason, Completed] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }

    #[test]
    fn history_appends_in_order() {
        let mut state = ConversationState::default();
        state.record_greeting("¿Qué tan probable es que nos recomiendes?");
        state.record_turn("8", "¡Gracias! ¿Por qué?");

        let roles: Vec<Role> = state.history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(state.history[1].content, "8");
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = ConversationState::default();
        state.record_turn("9", "gracias");
        state.transition_to(SurveyPhase::AwaitingReason).unwrap();
        state.last_rating = Some("9".to_string());

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn state_without_rating_omits_field() {
        let json = serde_json::to_value(ConversationState::default()).unwrap();
        assert_eq!(json["phase"], "awaiting_rating");
        assert!(json.get("last_rating").is_none());
    }
}
