//! System prompts for each survey phase and parsing of the rating markers
//! the model is told to prepend.

use regex::{Regex, RegexBuilder};

use crate::config::SurveyConfig;

/// Prepended by the model when the user's message is a valid 0–10 rating.
pub const VALID_RATING_MARKER: &str = "[VALID_RATING]";
/// Prepended by the model when it is not.
pub const INVALID_RATING_MARKER: &str = "[INVALID_RATING]";

/// Keywords that betray a reason question in an unmarked reply.
pub const DEFAULT_REASON_KEYWORDS: &[&str] = &["motivo", "razón", "cuéntanos más"];

fn rating_question(config: &SurveyConfig) -> String {
    format!(
        "En una escala del 0 al 10, ¿qué tan probable es que recomiendes {} a un amigo o colega?",
        config.product_name
    )
}

/// Opening prompt: greeting, product notice and the rating question.
pub fn start_prompt(greeting: &str, config: &SurveyConfig) -> String {
    format!(
        "\
Eres el asistente de encuestas de satisfacción de {product}. Escribe un único mensaje breve y cordial para el usuario.

El mensaje debe:
1. Comenzar exactamente con el saludo \"{greeting}\".
2. Explicar en una frase que estamos mejorando {product} y que su opinión nos ayuda mucho.
3. Terminar con esta pregunta, sin cambiarla: \"{question}\"

No hagas ninguna otra pregunta.",
        product = config.product_name,
        question = rating_question(config),
    )
}

/// Prompt for the rating turn. The model judges the rating and marks its reply.
pub fn rating_prompt(config: &SurveyConfig, user_message: &str) -> String {
    format!(
        "\
Eres el asistente de encuestas de satisfacción de {product}. Le preguntaste al usuario: \"{question}\"
El usuario respondió: \"{user_message}\"

Decide si la respuesta es una calificación numérica válida entre 0 y 10 (se aceptan números escritos con letras).

- Si ES válida: agradece brevemente la calificación y pregunta cuál es el motivo principal de su puntuación. \
Empieza tu respuesta exactamente con {valid}
- Si NO es válida: explica con amabilidad que necesitas un número del 0 al 10 y repite la pregunta. \
Empieza tu respuesta exactamente con {invalid}

Usa solo una de las dos marcas y no escribas nada antes de ella.",
        product = config.product_name,
        question = rating_question(config),
        valid = VALID_RATING_MARKER,
        invalid = INVALID_RATING_MARKER,
    )
}

/// Prompt for the reason turn. Closes the survey.
pub fn reason_prompt(config: &SurveyConfig, rating: Option<&str>, user_message: &str) -> String {
    let rating = rating.unwrap_or("(no registrada)");
    format!(
        "\
Eres el asistente de encuestas de satisfacción de {product}. El usuario calificó {product} con: \"{rating}\".
Luego explicó el motivo de su calificación: \"{user_message}\"

Agradece sinceramente su tiempo y sus comentarios, menciona brevemente lo que compartió y \
cierra la encuesta con una despedida. No hagas más preguntas.",
        product = config.product_name,
    )
}

/// Prompt used after the survey has ended.
pub fn closed_prompt(config: &SurveyConfig, user_message: &str) -> String {
    format!(
        "\
Eres el asistente de encuestas de satisfacción de {product}. La encuesta con este usuario ya terminó.
El usuario escribió: \"{user_message}\"

Explica con amabilidad que la encuesta ha finalizado y que, para cualquier otra consulta, \
puede comunicarse con {support}. No hagas preguntas.",
        product = config.product_name,
        support = config.support_channel,
    )
}

/// How the model classified the user's rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingVerdict {
    Valid,
    Invalid,
    /// The model ignored the marker instruction.
    Unmarked,
}

/// A rating-turn reply with its verdict and markers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedReply {
    pub verdict: RatingVerdict,
    pub text: String,
}

/// Classify a rating-turn reply by its marker.
///
/// The earliest marker wins. All marker occurrences are stripped from the
/// display text.
pub fn classify_rating_reply(reply: &str) -> ClassifiedReply {
    let valid_at = reply.find(VALID_RATING_MARKER);
    let invalid_at = reply.find(INVALID_RATING_MARKER);

    let verdict = match (valid_at, invalid_at) {
        (Some(v), Some(i)) if v < i => RatingVerdict::Valid,
        (Some(_), Some(_)) => RatingVerdict::Invalid,
        (Some(_), None) => RatingVerdict::Valid,
        (None, Some(_)) => RatingVerdict::Invalid,
        (None, None) => RatingVerdict::Unmarked,
    };

    let text = reply
        .replace(VALID_RATING_MARKER, "")
        .replace(INVALID_RATING_MARKER, "")
        .trim()
        .to_string();

    ClassifiedReply { verdict, text }
}

/// Decides whether an unmarked rating-turn reply should still advance the
/// survey to the reason question.
pub trait UnmarkedReplyPolicy: Send + Sync {
    fn advances_to_reason(&self, reply: &str) -> bool;
}

/// Advances when the reply mentions any keyword, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordFallback {
    pattern: Regex,
}

impl KeywordFallback {
    pub fn with_keywords(keywords: &[&str]) -> Result<Self, regex::Error> {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }
}

impl Default for KeywordFallback {
    fn default() -> Self {
        Self::with_keywords(DEFAULT_REASON_KEYWORDS).expect("escaped keywords always compile")
    }
}

impl UnmarkedReplyPolicy for KeywordFallback {
    fn advances_to_reason(&self, reply: &str) -> bool {
        self.pattern.is_match(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SurveyConfig {
        SurveyConfig {
            product_name: "Acme Pagos".to_string(),
            support_channel: "soporte@acme.example".to_string(),
        }
    }

    #[test]
    fn start_prompt_has_greeting_and_question() {
        let prompt = start_prompt("¡Buenas tardes!", &config());
        assert!(prompt.contains("\"¡Buenas tardes!\""));
        assert!(prompt.contains("Acme Pagos"));
        assert!(prompt.contains("del 0 al 10"));
    }

    #[test]
    fn rating_prompt_names_both_markers_and_message() {
        let prompt = rating_prompt(&config(), "ocho");
        assert!(prompt.contains(VALID_RATING_MARKER));
        assert!(prompt.contains(INVALID_RATING_MARKER));
        assert!(prompt.contains("\"ocho\""));
    }

    #[test]
    fn reason_prompt_includes_rating() {
        let prompt = reason_prompt(&config(), Some("8"), "rápido");
        assert!(prompt.contains("\"8\""));
        assert!(prompt.contains("rápido"));
        assert!(prompt.contains("No hagas más preguntas"));

        let unknown = reason_prompt(&config(), None, "rápido");
        assert!(unknown.contains("(no registrada)"));
    }

    #[test]
    fn closed_prompt_redirects_to_support() {
        let prompt = closed_prompt(&config(), "hola otra vez");
        assert!(prompt.contains("ya terminó"));
        assert!(prompt.contains("soporte@acme.example"));
    }

    #[test]
    fn classify_valid_marker() {
        let r = classify_rating_reply("[VALID_RATING] Thanks! Why?");
        assert_eq!(r.verdict, RatingVerdict::Valid);
        assert_eq!(r.text, "Thanks! Why?");
    }

    #[test]
    fn classify_invalid_marker() {
        let r = classify_rating_reply("[INVALID_RATING] please give 0-10");
        assert_eq!(r.verdict, RatingVerdict::Invalid);
        assert_eq!(r.text, "please give 0-10");
    }

    #[test]
    fn classify_marker_after_whitespace_or_inline() {
        let r = classify_rating_reply("\n  [VALID_RATING]\n¡Gracias!");
        assert_eq!(r.verdict, RatingVerdict::Valid);
        assert_eq!(r.text, "¡Gracias!");

        let r = classify_rating_reply("Entendido. [INVALID_RATING]");
        assert_eq!(r.verdict, RatingVerdict::Invalid);
        assert_eq!(r.text, "Entendido.");
    }

    #[test]
    fn classify_earliest_marker_wins() {
        let r = classify_rating_reply("[INVALID_RATING] no... [VALID_RATING] sí");
        assert_eq!(r.verdict, RatingVerdict::Invalid);
        assert!(!r.text.contains('['));
    }

    #[test]
    fn classify_unmarked() {
        let r = classify_rating_reply("  ¿Cuál es la razón de tu nota?  ");
        assert_eq!(r.verdict, RatingVerdict::Unmarked);
        assert_eq!(r.text, "¿Cuál es la razón de tu nota?");
    }

    #[test]
    fn keyword_fallback_matches_case_insensitively() {
        let policy = KeywordFallback::default();
        assert!(policy.advances_to_reason("¿Cuál es el MOTIVO?"));
        assert!(policy.advances_to_reason("Dinos la Razón, por favor"));
        assert!(policy.advances_to_reason("RAZÓN"));
        assert!(policy.advances_to_reason("Cuéntanos más sobre tu experiencia"));
        assert!(!policy.advances_to_reason("Por favor, indica un número del 0 al 10."));
    }

    #[test]
    fn keyword_fallback_custom_keywords_are_escaped() {
        let policy = KeywordFallback::with_keywords(&["why?", "reason"]).unwrap();
        assert!(policy.advances_to_reason("So, WHY? tell me"));
        assert!(!policy.advances_to_reason("wh"));
    }
}
