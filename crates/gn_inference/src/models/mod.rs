use std::sync::Arc;

use gn_core::{Config, Error, InferenceModel, LlmConfig, LlmProvider, Result};
use tracing::info;

pub mod azure_openai;
pub mod dummy;

pub use azure_openai::AzureOpenAiModel;
pub use dummy::DummyModel;

/// Build the model selected by `LLM_PROVIDER`.
pub fn create_model(config: &Config) -> Result<Arc<dyn InferenceModel>> {
    match config.llm.provider {
        LlmProvider::AzureOpenAi => {
            validate_azure_openai(&config.llm)?;
            let model = AzureOpenAiModel::new(&config.llm)?;
            info!("🤖 Using Azure OpenAI deployment {}", config.llm.deployment);
            Ok(Arc::new(model))
        }
        LlmProvider::Dummy => {
            info!("🤖 Using dummy model, no LLM calls will be made");
            Ok(Arc::new(DummyModel::new()))
        }
    }
}

fn validate_azure_openai(config: &LlmConfig) -> Result<()> {
    if config.api_key.is_none() {
        return Err(Error::Config("Azure OpenAI API key is not set in the configuration".to_string()));
    }
    if config.endpoint.is_none() {
        return Err(Error::Config("Azure OpenAI endpoint is not set in the configuration".to_string()));
    }
    if config.api_version.trim().is_empty() {
        return Err(Error::Config("Azure OpenAI API version is not set in the configuration".to_string()));
    }

    let few_shot = config.few_shot_examples_path();
    if !few_shot.is_file() {
        return Err(Error::Config(format!(
            "Few-shot examples file not found: {}",
            few_shot.display()
        )));
    }
    let system_prompt = config.system_prompt_path();
    if !system_prompt.is_file() {
        return Err(Error::Config(format!(
            "System prompt file not found: {}",
            system_prompt.display()
        )));
    }
    Ok(())
}
