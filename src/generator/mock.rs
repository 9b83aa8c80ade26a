/// Mock generator for tests and offline runs.
use std::cell::RefCell;

use super::{GenerateError, Generator};

/// Returns a canned reply (or a canned failure) and remembers every prompt.
pub struct MockGenerator {
    reply: Result<String, String>,
    prompts: RefCell<Vec<String>>,
}

impl MockGenerator {
    #[must_use]
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// A generator whose every call fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Generator for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.reply.clone().map_err(GenerateError::Other)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
