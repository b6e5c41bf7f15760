//! Prompt construction for the summarization stages

use docsum_core::Prompt;

const DEFAULT_SYSTEM: &str = "You are an expert scientific writer. You write faithful, concise \
summaries of research documents. Never add facts that are not in the provided text.";

/// Builder for constructing role-structured prompts
#[derive(Debug, Default)]
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    task: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the task statement
    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> Prompt {
        let mut user = String::new();

        if !self.task.is_empty() {
            user.push_str(&self.task);
            user.push_str("\n\n");
        }

        if !self.context_sections.is_empty() {
            user.push_str("<context>\n");
            for section in &self.context_sections {
                user.push_str(section);
                user.push_str("\n\n");
            }
            user.push_str("</context>\n\n");
        }

        if !self.instructions.is_empty() {
            user.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                user.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            user.push_str("</instructions>\n");
        }

        Prompt::new(self.system_instruction, user.trim_end())
    }
}

/// Fixed prompts used by map-reduce and refine
#[derive(Debug, Clone)]
pub struct SummaryPrompts {
    system: String,
}

impl SummaryPrompts {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
        }
    }

    fn builder(&self) -> PromptBuilder {
        PromptBuilder::new().system(self.system.clone())
    }

    /// Summarize one chunk (map step, and the first refine step)
    pub fn chunk(&self, text: &str) -> Prompt {
        self.builder()
            .task("Write a concise summary of the following text.")
            .add_context(text)
            .add_instruction("Keep the key findings, methods and conclusions.")
            .add_instruction("Answer with the summary only.")
            .build()
    }

    /// Merge partial summaries of one document into one (collapse and reduce)
    pub fn combine(&self, summaries: &[String]) -> Prompt {
        summaries
            .iter()
            .fold(
                self.builder()
                    .task("The following are summaries of consecutive parts of one document. Combine them into a single concise summary."),
                |builder, summary| builder.add_context(summary.as_str()),
            )
            .add_instruction("Remove repetition between the parts.")
            .add_instruction("Answer with the summary only.")
            .build()
    }

    /// Extend an existing summary with the next chunk
    pub fn refine(&self, existing: &str, text: &str) -> Prompt {
        self.builder()
            .task("Produce a final summary. An existing summary up to a certain point is given first, followed by more context from the same document.")
            .add_context(format!("Existing summary:\n{existing}"))
            .add_context(format!("New context:\n{text}"))
            .add_instruction("Refine the existing summary with the new context, only if needed.")
            .add_instruction("If the new context is not useful, return the existing summary unchanged.")
            .add_instruction("Answer with the summary only.")
            .build()
    }
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM)
    }
}
