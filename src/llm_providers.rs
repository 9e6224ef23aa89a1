use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProviderType {
    OpenAI,
    Gemini,
}

impl LLMProviderType {
    /// Parse a provider name, accepting common aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => Some(LLMProviderType::OpenAI),
            "gemini" | "google" => Some(LLMProviderType::Gemini),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion client for the configured provider.
#[derive(Debug, Clone)]
pub struct LLMProvider {
    kind: LLMProviderType,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<LLMMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl LLMProvider {
    pub fn new(kind: LLMProviderType, api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        let (default_url, default_model) = match kind {
            LLMProviderType::OpenAI => ("https://api.openai.com/v1", "gpt-4o-mini"),
            LLMProviderType::Gemini => ("https://generativelanguage.googleapis.com/v1beta", "gemini-2.0-flash"),
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            kind,
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| default_url.to_string()),
            model: model.unwrap_or_else(|| default_model.to_string()),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self.kind {
            LLMProviderType::OpenAI => "OpenAI",
            LLMProviderType::Gemini => "Gemini",
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send one prompt and return the raw text of the first completion.
    pub async fn make_request(&self, system_message: Option<&str>, prompt: &str, temperature: f32) -> Result<String> {
        info!(
            provider = self.provider_name(),
            model = %self.model,
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        let content = match self.kind {
            LLMProviderType::OpenAI => self.openai_request(system_message, prompt, temperature).await?,
            LLMProviderType::Gemini => self.gemini_request(system_message, prompt, temperature).await?,
        };

        info!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Successfully received LLM response"
        );
        Ok(content)
    }

    async fn openai_request(&self, system_message: Option<&str>, prompt: &str, temperature: f32) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_message {
            messages.push(LLMMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(LLMMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAIRequest {
                model: &self.model,
                messages,
                temperature,
            })
            .send()
            .await?;

        let response = self.check_status(response).await?;
        let body: OpenAIResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenAI response"))
    }

    async fn gemini_request(&self, system_message: Option<&str>, prompt: &str, temperature: f32) -> Result<String> {
        let text = match system_message {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            ))
            .json(&GeminiRequest {
                contents: vec![GeminiContent {
                    parts: vec![GeminiPart { text }],
                }],
                generation_config: GeminiGenerationConfig {
                    temperature,
                    max_output_tokens: 1024,
                },
            })
            .send()
            .await?;

        let response = self.check_status(response).await?;
        let body: GeminiResponse = response.json().await?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| anyhow!("No candidates in Gemini response"))
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            provider = self.provider_name(),
            status = %status,
            error = %error_text,
            "LLM API request failed"
        );
        Err(anyhow!("{} API request failed ({}): {}", self.provider_name(), status, error_text))
    }
}

/// Pulls JSON out of completions that wrap it in markdown or prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonResponseParser;

impl JsonResponseParser {
    pub fn extract_json_from_response(content: &str) -> String {
        for fence in ["```json", "```"] {
            if let Some(start) = content.find(fence) {
                let body_start = start + fence.len();
                if let Some(end) = content[body_start..].find("```") {
                    let candidate = content[body_start..body_start + end].trim();
                    if candidate.starts_with('{') || candidate.starts_with('[') {
                        return candidate.to_string();
                    }
                }
            }
        }

        for (open, close) in [('{', '}'), ('[', ']')] {
            if let (Some(start), Some(end)) = (content.find(open), content.rfind(close)) {
                if end > start {
                    return content[start..=end].to_string();
                }
            }
        }

        content.trim().to_string()
    }

    pub fn parse_json_response<T>(&self, content: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let json_content = Self::extract_json_from_response(content);
        serde_json::from_str::<T>(&json_content).map_err(|e| anyhow!("Failed to parse JSON response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!(LLMProviderType::parse("OpenAI"), Some(LLMProviderType::OpenAI));
        assert_eq!(LLMProviderType::parse("gpt"), Some(LLMProviderType::OpenAI));
        assert_eq!(LLMProviderType::parse("Google"), Some(LLMProviderType::Gemini));
        assert_eq!(LLMProviderType::parse("claude"), None);
    }

    #[test]
    fn test_defaults_per_provider() {
        let openai = LLMProvider::new(LLMProviderType::OpenAI, "k".to_string(), None, None);
        assert_eq!(openai.provider_name(), "OpenAI");
        assert_eq!(openai.model_name(), "gpt-4o-mini");

        let gemini = LLMProvider::new(LLMProviderType::Gemini, "k".to_string(), None, Some("gemini-pro".to_string()));
        assert_eq!(gemini.provider_name(), "Gemini");
        assert_eq!(gemini.model_name(), "gemini-pro");
    }

    #[test]
    fn test_extract_json_from_markdown() {
        let content = "Here you go:\n```json\n{\"question\": \"1 + 1\"}\n```\nEnjoy";
        assert_eq!(JsonResponseParser::extract_json_from_response(content), "{\"question\": \"1 + 1\"}");
    }

    #[test]
    fn test_extract_bare_json() {
        let content = "Sure! {\"a\": 1} hope that helps";
        assert_eq!(JsonResponseParser::extract_json_from_response(content), "{\"a\": 1}");
        assert_eq!(JsonResponseParser::extract_json_from_response("  nothing  "), "nothing");
    }
}
