//! NPS survey: a two-question chat that collects a 0–10 rating and the
//! reason behind it.
//!
//! The model drives the wording. The manager only reads the control markers
//! it emits (`[VALID_RATING]` / `[INVALID_RATING]`) to decide when to move
//! from the rating question to the reason question, and closes the survey
//! after the reason is answered.

pub mod greeting;
pub mod manager;
pub mod prompts;
pub mod routes;
pub mod state;

pub use greeting::greeting_prefix;
pub use manager::{SurveyManager, SurveyStatus, TurnOutcome, spawn_expiry_task};
pub use prompts::{
    ClassifiedReply, KeywordFallback, RatingVerdict, UnmarkedReplyPolicy, classify_rating_reply,
};
pub use routes::{SESSION_COOKIE, SurveyRouteState, survey_routes};
pub use state::{ConversationState, SurveyPhase};
