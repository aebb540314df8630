//! NPS Survey — conversational customer-satisfaction survey backed by a
//! hosted model endpoint.

pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod survey;
