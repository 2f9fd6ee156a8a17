use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use common::{
    env_config::GeminiConfig,
    error::{AppError, Res},
};

use crate::dtos::edit::ImagePart;

/// Suffix appended to every instruction to bias the model toward replying
/// with an image part instead of prose.
const IMAGE_ONLY_SUFFIX: &str =
    "\n\nReturn only the edited image. Do not reply with text.";

/// Relevant subset of the generateContent response: the first candidate's
/// parts, from which an inline image is extracted.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Part {
    pub text: Option<String>,
    #[serde(rename = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// First inline image carried by the response, if the model returned one.
pub fn extract_inline_image(response: &GenerateContentResponse) -> Option<&InlineData> {
    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| part.inline_data.as_ref())
}

/// Narrow client over the generative image API: one bounded synchronous
/// call per request, no retry, no streaming.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        GeminiClient {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Whether an upstream API key is configured at all.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn api_url(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }

    fn build_payload(prompt: &str, images: &[ImagePart], temperature: Option<f64>) -> Value {
        let mut parts = vec![json!({ "text": format!("{}{}", prompt, IMAGE_ONLY_SUFFIX) })];
        for image in images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }

        let mut payload = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        });
        if let Some(temperature) = temperature {
            payload["generationConfig"]["temperature"] = json!(temperature);
        }
        payload
    }

    /// Forwards a single generateContent call. The raw response is handed
    /// back so the caller decides whether to relay it verbatim or extract
    /// the image part.
    pub async fn generate(
        &self,
        prompt: &str,
        images: &[ImagePart],
        temperature: Option<f64>,
    ) -> Res<reqwest::Response> {
        if !self.is_configured() {
            return Err(AppError::Upstream(
                "Generative API key is not configured".to_string(),
            ));
        }

        let payload = Self::build_payload(prompt, images, temperature);
        self.client
            .post(self.api_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Generative API request failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_from(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn inline_image_is_extracted_from_candidates() {
        let response = response_from(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                    ]
                }
            }]
        }));

        let image = extract_inline_image(&response).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "AAAA");
    }

    #[test]
    fn text_only_reply_has_no_image() {
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I cannot edit that image." }] }
            }]
        }));

        assert!(extract_inline_image(&response).is_none());
    }

    #[test]
    fn empty_response_has_no_image() {
        let response = response_from(json!({}));
        assert!(extract_inline_image(&response).is_none());
    }

    #[test]
    fn payload_carries_prompt_suffix_and_images() {
        let images = vec![
            ImagePart {
                mime_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            },
            ImagePart {
                mime_type: "image/jpeg".to_string(),
                data: "BBBB".to_string(),
            },
        ];
        let payload = GeminiClient::build_payload("make it red", &images, Some(0.4));

        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.starts_with("make it red"));
        assert!(text.contains("Return only the edited image"));
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(payload["generationConfig"]["temperature"], 0.4);
    }
}
