use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::generate::{GenerateError, RewriteRequest, SectionPrompt, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

impl OpenAiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url = std::env::var("BOOKWRIGHT_OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let model =
            std::env::var("BOOKWRIGHT_OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
        Ok(Self {
            base_url,
            api_key,
            model,
            temperature: 0.7,
        })
    }

    fn responses_endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }
}

/// Production `TextGenerator` over the OpenAI Responses API. Maps HTTP 429
/// and `insufficient_quota` error codes to the quota-exceeded class; every
/// other failure is ordinary.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build http client")?;
        Ok(Self { client, config })
    }

    async fn responses_text(
        &self,
        instructions: &str,
        input: &str,
    ) -> Result<String, GenerateError> {
        let endpoint = self.config.responses_endpoint();
        let body = serde_json::json!({
            "model": self.config.model,
            "instructions": instructions,
            "input": input,
            "temperature": self.config.temperature,
            "text": { "format": { "type": "text" } },
            "store": false,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("read OpenAI response body")?;
        if !status.is_success() {
            if is_quota_error(status.as_u16(), &raw) {
                return Err(GenerateError::QuotaExceeded);
            }
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            return Err(GenerateError::Other(anyhow::anyhow!(
                "OpenAI API error ({status}): {message}"
            )));
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse OpenAI response")?;
        extract_output_text(&value)
            .context("extract output text")
            .map_err(GenerateError::Other)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate_section(&self, prompt: &SectionPrompt) -> Result<String, GenerateError> {
        let instructions = build_section_instructions(prompt);
        let input = format!(
            "Write the section \"{}\" of chapter \"{}\".",
            prompt.section_title, prompt.chapter_title
        );
        self.responses_text(&instructions, &input).await
    }

    async fn rewrite_text(&self, request: &RewriteRequest) -> Result<String, GenerateError> {
        let instructions = build_rewrite_instructions(&request.style, request.instruction.as_deref());
        self.responses_text(&instructions, &request.text).await
    }
}

fn build_section_instructions(prompt: &SectionPrompt) -> String {
    let mut instructions = format!(
        "You are a book author's writing assistant.\n\
\n\
Task: Draft the body of one book section.\n\
\n\
Context:\n\
- Book title: {book_title}\n",
        book_title = prompt.book_title,
    );
    if let Some(subtitle) = &prompt.book_subtitle {
        instructions.push_str(&format!("- Book subtitle: {subtitle}\n"));
    }
    instructions.push_str(&format!(
        "- Chapter title: {chapter}\n\
- Section title: {section}\n\
- Audience: {audience}\n\
- Writing style: {style}\n",
        chapter = prompt.chapter_title,
        section = prompt.section_title,
        audience = prompt.audience_profile,
        style = prompt.style,
    ));
    if let Some(instruction) = &prompt.instruction {
        instructions.push_str(&format!("- Additional instruction: {instruction}\n"));
    }
    instructions.push_str(
        "\n\
Hard rules:\n\
- Write prose that fits the section title; do not restate the title as a heading.\n\
- Stay within the scope of this one section.\n\
- Do not add commentary about this instruction text.\n\
\n\
Output:\n\
- Output ONLY the section body.\n",
    );
    instructions
}

fn build_rewrite_instructions(style: &str, instruction: Option<&str>) -> String {
    let mut instructions = format!(
        "You are a book editor.\n\
\n\
Task: Rewrite the input text into the \"{style}\" writing style.\n\
\n\
Hard rules:\n\
- Preserve every fact; do not add or drop information.\n\
- Keep the original structure and approximate length.\n",
    );
    if let Some(instruction) = instruction {
        instructions.push_str(&format!("- Additional instruction: {instruction}\n"));
    }
    instructions.push_str("\nOutput:\n- Output ONLY the rewritten text.\n");
    instructions
}

fn is_quota_error(status: u16, raw_body: &str) -> bool {
    if status == 429 {
        return true;
    }
    parse_error_code(raw_body).is_some_and(|code| code == "insufficient_quota")
}

fn parse_error_code(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let code = value.get("error")?.get("code")?.as_str()?.to_owned();
    Some(code)
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_output_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `output` array in response"))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let content = match item.get("content").and_then(|v| v.as_array()) {
            Some(content) => content,
            None => continue,
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            let Some(part_text) = part.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            text.push_str(part_text);
        }
    }

    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}
