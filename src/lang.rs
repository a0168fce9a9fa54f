//! UI language support and localized notice tables.
//!
//! The orchestrator core is language-agnostic except for a handful of
//! phrases its control decisions depend on: the development trigger phrase
//! and the user-facing notices emitted around provider fallback. Those are
//! kept here as data tables so they can be tested in isolation.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::provider::{ArchitectId, ErrorKind};

/// Supported UI languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum UiLang {
    /// English
    #[default]
    En,
    /// Italian
    It,
}

impl std::fmt::Display for UiLang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiLang::En => write!(f, "en"),
            UiLang::It => write!(f, "it"),
        }
    }
}

/// Development trigger phrases, one per supported language.
///
/// When a brainstorming-mode user message contains one of these
/// (case-insensitive), the session transitions to development.
pub const TRIGGER_PHRASES: &[(UiLang, &str)] = &[
    (UiLang::En, "START THE ENGINES"),
    (UiLang::It, "ACCENDI I MOTORI"),
];

/// Check whether a user message contains a development trigger phrase.
///
/// Matching is case-insensitive and accepts either language's phrase
/// regardless of the session language, mirroring how users actually mix
/// languages in practice.
#[must_use]
pub fn contains_trigger_phrase(input: &str) -> bool {
    let upper = input.to_uppercase();
    TRIGGER_PHRASES
        .iter()
        .any(|(_, phrase)| upper.contains(phrase))
}

/// Localized notice emitted when a provider error triggers a fallback
/// attempt.
#[must_use]
pub fn fallback_notice(kind: ErrorKind, lang: UiLang) -> &'static str {
    match (lang, kind) {
        (UiLang::En, ErrorKind::RateLimit) => {
            "Service temporarily overloaded. Switching to the alternative architect to continue."
        }
        (UiLang::En, ErrorKind::QuotaExceeded) => {
            "API quota reached for this provider. Continuing with the alternative architect."
        }
        (UiLang::En, ErrorKind::UsageLimit) => {
            "Usage limit reached. Switching to the backup architect to continue the session."
        }
        (UiLang::En, ErrorKind::ConnectionError) => {
            "Connection issue detected. Trying the alternative architect."
        }
        (UiLang::En, ErrorKind::ApiKeyInvalid) => {
            "API key not configured or invalid. Switching to the alternative architect."
        }
        (UiLang::En, ErrorKind::Timeout) => {
            "The architect did not answer in time. Trying the alternative architect."
        }
        (UiLang::En, ErrorKind::Unknown) => {
            "Temporary error detected. Switching architect to maintain continuity."
        }
        (UiLang::It, ErrorKind::RateLimit) => {
            "Servizio temporaneamente sovraccarico. Passo all'architetto alternativo per continuare."
        }
        (UiLang::It, ErrorKind::QuotaExceeded) => {
            "Quota API raggiunta per questo provider. Continuo con l'architetto alternativo."
        }
        (UiLang::It, ErrorKind::UsageLimit) => {
            "Limite di utilizzo raggiunto. Passo all'architetto di riserva per proseguire la sessione."
        }
        (UiLang::It, ErrorKind::ConnectionError) => {
            "Problema di connessione rilevato. Provo con l'architetto alternativo."
        }
        (UiLang::It, ErrorKind::ApiKeyInvalid) => {
            "Chiave API non configurata o non valida. Passo all'architetto alternativo."
        }
        (UiLang::It, ErrorKind::Timeout) => {
            "L'architetto non ha risposto in tempo. Provo con l'architetto alternativo."
        }
        (UiLang::It, ErrorKind::Unknown) => {
            "Errore temporaneo rilevato. Cambio architetto per mantenere la continuità."
        }
    }
}

/// Notice emitted when both architects have failed and the session must
/// be suspended.
#[must_use]
pub fn both_failed_notice(lang: UiLang) -> &'static str {
    match lang {
        UiLang::En => {
            "Both architects have reached their limits. The session must be suspended; \
             please try again later."
        }
        UiLang::It => {
            "Entrambi gli architetti hanno raggiunto i loro limiti. La sessione deve essere \
             sospesa; riprova più tardi."
        }
    }
}

/// System turn injected when a session resumes from a checkpoint.
///
/// The architect is told to re-derive its position from the working
/// directory instead of trusting a transcript that may be stale.
#[must_use]
pub fn recovery_feedback(lang: UiLang) -> &'static str {
    match lang {
        UiLang::En => {
            "The session was interrupted and has been resumed from a checkpoint. \
             Re-read the project directory, compare it against the plan, and \
             continue from the actual state on disk."
        }
        UiLang::It => {
            "La sessione è stata interrotta e ripresa da un checkpoint. Rileggi \
             la directory del progetto, confrontala con il piano e continua \
             dallo stato reale su disco."
        }
    }
}

/// Notice emitted after a successful fallback switch.
#[must_use]
pub fn fallback_success_notice(lang: UiLang, architect: ArchitectId) -> String {
    match lang {
        UiLang::En => format!("Switch completed. The session continues with {architect}."),
        UiLang::It => format!("Passaggio completato. La sessione continua con {architect}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_phrase_english() {
        assert!(contains_trigger_phrase("ok, start the engines!"));
        assert!(contains_trigger_phrase("START THE ENGINES"));
    }

    #[test]
    fn test_trigger_phrase_italian() {
        assert!(contains_trigger_phrase("va bene, ACCENDI I MOTORI!"));
        assert!(contains_trigger_phrase("accendi i motori"));
    }

    #[test]
    fn test_trigger_phrase_absent() {
        assert!(!contains_trigger_phrase("let's keep discussing the schema"));
        assert!(!contains_trigger_phrase(""));
    }

    #[test]
    fn test_fallback_notice_covers_all_kinds() {
        for kind in ErrorKind::ALL {
            assert!(!fallback_notice(kind, UiLang::En).is_empty());
            assert!(!fallback_notice(kind, UiLang::It).is_empty());
        }
    }

    #[test]
    fn test_fallback_success_mentions_architect() {
        let msg = fallback_success_notice(UiLang::En, ArchitectId::Claude);
        assert!(msg.contains("claude"));
    }
}
