//! Result of a successful handler invocation

use super::context::ContextUpdate;
use super::effect::OutboundMessage;
use super::state::{Platform, WorkflowState};

/// What a handler asks the manager to commit
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next_state: WorkflowState,
    pub updates: Vec<ContextUpdate>,
    /// Handler-specific messages, sent before the next state's prompt
    pub messages: Vec<OutboundMessage>,
    /// Render the template of `next_state` after committing
    pub prompt: bool,
    /// Immediately run the handler of `next_state` with `Input::Enter`
    pub chain: bool,
    /// Platforms that failed during execution, reported but not retried
    pub failed_platforms: Vec<(Platform, String)>,
}

impl Transition {
    /// Move to `next_state` and prompt for it
    pub fn to(next_state: WorkflowState) -> Self {
        Self {
            next_state,
            updates: vec![],
            messages: vec![],
            prompt: true,
            chain: false,
            failed_platforms: vec![],
        }
    }

    /// Stay in `state` with a context change; no prompt unless requested
    pub fn stay(state: WorkflowState) -> Self {
        Self {
            prompt: false,
            ..Self::to(state)
        }
    }

    pub fn with_update(mut self, update: ContextUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn with_updates(mut self, updates: impl IntoIterator<Item = ContextUpdate>) -> Self {
        self.updates.extend(updates);
        self
    }

    pub fn with_message(mut self, message: OutboundMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_prompt(mut self) -> Self {
        self.prompt = true;
        self
    }

    /// Enter the next state without waiting for more input
    pub fn chained(mut self) -> Self {
        self.chain = true;
        self.prompt = false;
        self
    }

    pub fn with_failed_platforms(mut self, failed: Vec<(Platform, String)>) -> Self {
        self.failed_platforms = failed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_prompts_and_stay_does_not() {
        assert!(Transition::to(WorkflowState::PlatformSelection).prompt);
        assert!(!Transition::stay(WorkflowState::CaptionGeneration).prompt);
        assert!(
            Transition::stay(WorkflowState::CaptionGeneration)
                .with_prompt()
                .prompt
        );
    }

    #[test]
    fn test_chained_suppresses_prompt() {
        let t = Transition::to(WorkflowState::CaptionGeneration).chained();
        assert!(t.chain);
        assert!(!t.prompt);
    }
}
