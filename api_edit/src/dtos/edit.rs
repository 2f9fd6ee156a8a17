use base64::Engine;
use serde::{Deserialize, Serialize};

use common::error::{AppError, Res};

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub prompt: String,
    pub image1: Option<String>,
    pub image2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image1: Option<String>,
    pub image2: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub image: ImagePayload,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// A reference image decoded from the request: MIME type plus raw base64.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: String,
}

/// Decodes an inline image, either a `data:<mime>;base64,<data>` URL or a
/// bare base64 string (treated as PNG). The base64 payload is validated so
/// garbage never reaches the upstream API.
pub fn parse_data_url(input: &str) -> Res<ImagePart> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Image payload is empty".to_string()));
    }

    let (mime_type, data) = if let Some(rest) = trimmed.strip_prefix("data:") {
        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| AppError::BadRequest("Malformed data URL".to_string()))?;
        if !meta.ends_with(";base64") {
            return Err(AppError::BadRequest(
                "Data URL must be base64-encoded".to_string(),
            ));
        }
        let mime = meta.trim_end_matches(";base64");
        let mime = if mime.is_empty() { "image/png" } else { mime };
        (mime.to_string(), data.to_string())
    } else {
        ("image/png".to_string(), trimmed.to_string())
    };

    base64::engine::general_purpose::STANDARD
        .decode(&data)
        .map_err(|_| AppError::BadRequest("Image payload is not valid base64".to_string()))?;

    Ok(ImagePart { mime_type, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_yields_mime_and_payload() {
        let part = parse_data_url("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(part.mime_type, "image/jpeg");
        assert_eq!(part.data, "AAAA");
    }

    #[test]
    fn bare_base64_defaults_to_png() {
        let part = parse_data_url("AAAA").unwrap();
        assert_eq!(part.mime_type, "image/png");
        assert_eq!(part.data, "AAAA");
    }

    #[test]
    fn missing_mime_defaults_to_png() {
        let part = parse_data_url("data:;base64,AAAA").unwrap();
        assert_eq!(part.mime_type, "image/png");
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!(parse_data_url("").is_err());
        assert!(parse_data_url("data:image/png;base64").is_err());
        assert!(parse_data_url("data:image/png,AAAA").is_err());
        assert!(parse_data_url("data:image/png;base64,not base64!").is_err());
    }
}
