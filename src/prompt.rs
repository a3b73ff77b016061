/// Builds the generation prompt from a question and ranked context passages.
pub trait PromptAssembler {
    fn build(&self, question: &str, contexts: &[String]) -> String;
}

/// Labels each passage `[1]`, `[2]`, … in rank order so answers can cite them.
pub struct NumberedContextPrompt {
    instructions: String,
}

impl Default for NumberedContextPrompt {
    fn default() -> Self {
        Self {
            instructions: "Answer the question using only the context below. Cite the passages you rely on by their number, e.g. [1]. If the context does not contain the answer, say so.".to_string(),
        }
    }
}

impl PromptAssembler for NumberedContextPrompt {
    fn build(&self, question: &str, contexts: &[String]) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.instructions.trim());
        prompt.push_str("\n\nContext:\n");
        for (index, context) in contexts.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n\n", index + 1, context.trim()));
        }
        prompt.push_str("Question: ");
        prompt.push_str(question.trim());
        prompt.push_str("\nAnswer:");
        prompt
    }
}
