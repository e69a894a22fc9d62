//! Few-shot prompt assembly for metadata extraction.

use std::collections::HashMap;
use std::path::Path;

use gn_core::{Error, LlmConfig, Result};
use serde_json::Value;

const EXAMPLE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system_prompt: String,
    examples: Vec<FewShotExample>,
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>, examples: Vec<FewShotExample>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            examples,
        }
    }

    pub fn load(config: &LlmConfig) -> Result<Self> {
        let system_prompt = load_system_prompt(&config.system_prompt_path())?;
        let examples = load_few_shot_examples(&config.few_shot_examples_path())?;
        Ok(Self::new(system_prompt, examples))
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    /// Prompt for one article: system prompt, worked examples, then the article.
    pub fn render(&self, content: &str) -> String {
        let suffix = format!("\n{content}");
        let examples = self
            .examples
            .iter()
            .map(|e| format!("Article: {}\n{}", e.input, e.output));

        std::iter::once(self.system_prompt.clone())
            .chain(examples)
            .chain(std::iter::once(suffix))
            .filter(|piece| !piece.is_empty())
            .collect::<Vec<_>>()
            .join(EXAMPLE_SEPARATOR)
    }
}

pub fn load_system_prompt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("System prompt file not found: {} ({e})", path.display())))
}

pub fn load_few_shot_examples(path: &Path) -> Result<Vec<FewShotExample>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Error loading few-shot examples: {} ({e})", path.display())))?;
    parse_few_shot_examples(&raw)
}

/// Examples are a JSON array of objects with string values only, each
/// carrying at least `input` and `output`.
pub fn parse_few_shot_examples(raw: &str) -> Result<Vec<FewShotExample>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Config(format!("Error loading few-shot examples: {e}")))?;
    let invalid = || Error::Config("Invalid few-shot examples format".to_string());

    let items = value.as_array().ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| {
            let fields = item
                .as_object()
                .ok_or_else(invalid)?
                .iter()
                .map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                .collect::<Option<HashMap<_, _>>>()
                .ok_or_else(invalid)?;

            match (fields.get("input"), fields.get("output")) {
                (Some(input), Some(output)) => Ok(FewShotExample {
                    input: input.to_string(),
                    output: output.to_string(),
                }),
                _ => Err(invalid()),
            }
        })
        .collect()
}
