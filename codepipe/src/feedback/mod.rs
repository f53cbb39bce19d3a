//! Human feedback: collection, prioritisation, incorporation and the
//! interactive pause between stages.

mod manager;
mod prompt;

pub use manager::{prioritize_feedback, FeedbackManager};
pub use prompt::{AlwaysIncorporate, ConsolePrompter, FeedbackPrompter, NeverIncorporate};

#[cfg(test)]
pub use prompt::MockFeedbackPrompter;
