//! Human-in-the-loop prompts.

use inquire::{Confirm, Text};
use tracing::debug;

/// Asks the human before anything irreversible happens.
pub trait Confirmer {
    /// Yes/no question. A prompt that cannot be answered counts as "no".
    fn confirm(&self, prompt: &str, default: bool) -> bool;

    /// Free-text answer; `None` when the prompt was cancelled.
    fn ask(&self, prompt: &str, default: Option<&str>) -> Option<String>;
}

/// Interactive terminal prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        match Confirm::new(prompt).with_default(default).prompt() {
            Ok(answer) => answer,
            Err(err) => {
                debug!(err = %err, "confirmation not answered");
                false
            }
        }
    }

    fn ask(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        let mut question = Text::new(prompt);
        if let Some(default) = default {
            question = question.with_default(default);
        }
        match question.prompt() {
            Ok(answer) => Some(answer.trim().to_string()),
            Err(err) => {
                debug!(err = %err, "text prompt not answered");
                None
            }
        }
    }
}

/// `--auto-approve`: every confirmation is "yes", text prompts take their default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Confirmer for AutoApprove {
    fn confirm(&self, _prompt: &str, _default: bool) -> bool {
        true
    }

    fn ask(&self, _prompt: &str, default: Option<&str>) -> Option<String> {
        default.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_approve_says_yes_and_takes_defaults() {
        assert!(AutoApprove.confirm("Run?", false));
        assert_eq!(AutoApprove.ask("Email", Some("a@b.io")).as_deref(), Some("a@b.io"));
        assert_eq!(AutoApprove.ask("Email", None), None);
    }
}
