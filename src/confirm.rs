//! Injectable confirmation for destructive operations.
//!
//! Commands that delete server-side state ask for confirmation through this
//! seam instead of reading standard input directly, so the resilient core
//! stays testable without a terminal.

use std::sync::Arc;

type ConfirmFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A confirmation capability: given a prompt, answer yes or no.
#[derive(Clone)]
pub struct Confirmation {
    ask: ConfirmFn,
}

impl Confirmation {
    /// Prompt the user on the terminal, defaulting to "no".
    pub fn interactive() -> Self {
        Self {
            ask: Arc::new(|prompt| {
                inquire::Confirm::new(prompt)
                    .with_default(false)
                    .prompt()
                    .unwrap_or(false)
            }),
        }
    }

    /// Approve everything; used by `--yes` and by tests.
    pub fn always() -> Self {
        Self {
            ask: Arc::new(|_| true),
        }
    }

    /// Deny everything.
    pub fn never() -> Self {
        Self {
            ask: Arc::new(|_| false),
        }
    }

    /// A custom answer function, for tests that record prompts.
    pub fn with_fn<F>(ask: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self { ask: Arc::new(ask) }
    }

    pub fn confirm(&self, prompt: &str) -> bool {
        (self.ask)(prompt)
    }
}
