//! Spoken feedback for tool results.
//!
//! Successful results are voiced by a [`FeedbackInjector`] from the plugin's
//! own template. Failures are voiced from a fixed per-locale table keyed by
//! [`ErrorCode`]; `UNKNOWN` always has an entry, so every result yields a
//! sentence.

use std::sync::Arc;

use toolcast_types::{ErrorCode, Locale, ToolResult};
use tracing::debug;

/// Turns a successful result into the plugin's confirmation line.
pub trait FeedbackInjector: Send + Sync {
    fn inject_confirmation(&self, tool_id: &str, result: &ToolResult) -> String;
}

/// Fixed sentence spoken for an error code.
pub fn error_sentence(code: ErrorCode, locale: Locale) -> &'static str {
    match locale {
        Locale::It => match code {
            ErrorCode::PluginNotFound => "Mi dispiace, non trovo questo strumento.",
            ErrorCode::ValidationFailed => {
                "Mi mancano alcune informazioni per usare questo strumento. Puoi ripetere?"
            }
            ErrorCode::PrerequisitesNotMet => {
                "Non posso ancora usare questo strumento, prima bisogna completare un passaggio."
            }
            ErrorCode::PermissionDenied => "Non ho il permesso di usare questo strumento.",
            ErrorCode::ExecutionFailed => {
                "Qualcosa è andato storto mentre usavo lo strumento. Riproviamo?"
            }
            ErrorCode::Timeout => "Lo strumento ci sta mettendo troppo tempo. Riproviamo tra poco.",
            ErrorCode::Unknown => "Si è verificato un errore imprevisto.",
        },
        Locale::En => match code {
            ErrorCode::PluginNotFound => "Sorry, I can't find that tool.",
            ErrorCode::ValidationFailed => {
                "I'm missing some details to use that tool. Could you say it again?"
            }
            ErrorCode::PrerequisitesNotMet => {
                "I can't use that tool yet, another step has to be completed first."
            }
            ErrorCode::PermissionDenied => "I'm not allowed to use that tool.",
            ErrorCode::ExecutionFailed => "Something went wrong while using the tool. Shall we try again?",
            ErrorCode::Timeout => "The tool is taking too long. Let's try again in a moment.",
            ErrorCode::Unknown => "An unexpected error occurred.",
        },
    }
}

/// Sentence spoken when no tool matched a transcript.
pub fn not_recognized_sentence(locale: Locale) -> &'static str {
    match locale {
        Locale::It => "Non ho riconosciuto nessuno strumento nella richiesta. Puoi ripetere?",
        Locale::En => "I didn't recognize a tool in that request. Could you say it again?",
    }
}

/// Converts tool results into one spoken sentence.
pub struct FeedbackHandler {
    injector: Arc<dyn FeedbackInjector>,
    locale: Locale,
}

impl FeedbackHandler {
    pub fn new(injector: Arc<dyn FeedbackInjector>, locale: Locale) -> Self {
        Self { injector, locale }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Confirmation line on success, localized error sentence otherwise.
    pub fn generate_feedback(&self, tool_id: &str, result: &ToolResult) -> String {
        if result.success {
            return self.injector.inject_confirmation(tool_id, result);
        }
        self.format_error_feedback(result).to_string()
    }

    /// Resolve the result's error code and look up its sentence.
    pub fn format_error_feedback(&self, result: &ToolResult) -> &'static str {
        let code = result.error_code();
        debug!(%code, "formatting error feedback");
        error_sentence(code, self.locale)
    }

    pub fn not_recognized(&self) -> &'static str {
        not_recognized_sentence(self.locale)
    }
}
