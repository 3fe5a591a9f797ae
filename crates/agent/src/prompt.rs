//! Structured system-prompt builder.
//!
//! Renders background, steps, and output guidance into the sectioned
//! instruction format the agents are primed with.

use std::fmt;

/// A structured system prompt.
///
/// ```
/// use neurite_agent::SystemPrompt;
///
/// let prompt = SystemPrompt::new(vec!["You are a support agent.".into()])
///     .with_steps(vec!["Identify the product.".into()])
///     .with_output(vec!["Answer in one paragraph.".into()]);
/// let instructions = String::from(prompt);
/// assert!(instructions.starts_with("# IDENTITY and PURPOSE"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    background: Vec<String>,
    steps: Vec<String>,
    output: Vec<String>,
}

impl SystemPrompt {
    pub fn new(background: Vec<String>) -> Self {
        Self {
            background,
            steps: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.output = output;
        self
    }
}

impl fmt::Display for SystemPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "# IDENTITY and PURPOSE\n{}", self.background.join("\n"))?;

        if !self.steps.is_empty() {
            write!(
                f,
                "\n\n# INTERNAL ASSISTANT STEPS\n{}",
                self.steps.join("\n")
            )?;
        }

        if !self.output.is_empty() {
            write!(
                f,
                "\n\n# OUTPUT INSTRUCTIONS\n{}\n - Always respond using the proper JSON schema.\n - Always use the available additional information and context to enhance the response.",
                self.output.join("\n - ")
            )?;
        }

        Ok(())
    }
}

impl From<SystemPrompt> for String {
    fn from(prompt: SystemPrompt) -> Self {
        prompt.to_string()
    }
}
