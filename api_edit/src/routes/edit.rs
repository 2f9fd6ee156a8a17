use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, get, http::StatusCode, post, web};
use api_auth::services::auth_client::AuthClient;
use common::{
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;

use crate::{
    dtos::edit::{
        EditRequest, GenerateRequest, GenerateResponse, HealthResponse, ImagePart, ImagePayload,
        parse_data_url,
    },
    services::gemini::{self, GeminiClient},
};

/// Reports whether the generative API key is configured.
#[get("/health")]
async fn get_health(gemini: web::Data<Arc<GeminiClient>>) -> Res<impl Responder> {
    Success::ok(HealthResponse {
        ok: gemini.is_configured(),
    })
}

fn decode_images(image1: Option<&str>, image2: Option<&str>) -> Res<Vec<ImagePart>> {
    let first = image1
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("image1 is required".to_string()))?;

    let mut images = vec![parse_data_url(first)?];
    if let Some(second) = image2.filter(|s| !s.trim().is_empty()) {
        images.push(parse_data_url(second)?);
    }
    Ok(images)
}

fn require_prompt(prompt: &str) -> Res<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("prompt is required".to_string()));
    }
    Ok(prompt)
}

/// When the caller is authenticated, one credit is consumed atomically
/// before the upstream call; anonymous requests pass through untouched.
async fn consume_credit_if_authenticated(
    req: &HttpRequest,
    auth: &AuthClient,
    pool: &PgPool,
) -> Res<()> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::to_string);
    let Some(token) = token else {
        return Ok(());
    };

    let identity = auth.get_user(&token).await?;
    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;
    match db::user::consume_credit(pool, user.id).await? {
        Some(user) => {
            log::debug!(
                "User {} consumed a credit ({}/{})",
                user.id,
                user.credits_used,
                user.credits_total
            );
            Ok(())
        }
        None => Err(AppError::Forbidden(
            "No credits remaining for this billing cycle".to_string(),
        )),
    }
}

fn upstream_failure(status: reqwest::StatusCode, detail: &str) -> AppError {
    let detail = detail.trim();
    if detail.is_empty() {
        AppError::Upstream(format!("Generative API returned {}", status))
    } else {
        AppError::Upstream(format!("Generative API returned {}: {}", status, detail))
    }
}

/// A successful reply must carry an image part; a text-only 200 becomes a
/// "no image" error instead of being relayed. Upstream failures pass
/// through with their status and body untouched.
fn relay_edit_response(status: StatusCode, body: web::Bytes) -> Res<HttpResponse> {
    if !status.is_success() {
        return Ok(HttpResponse::build(status)
            .content_type("application/json")
            .body(body));
    }

    let response: gemini::GenerateContentResponse = serde_json::from_slice(&body)
        .map_err(|e| AppError::Upstream(format!("Invalid upstream response: {}", e)))?;
    if gemini::extract_inline_image(&response).is_none() {
        log::warn!("Generative API reply carried no image part");
        return Ok(HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "No image returned by the model",
        })));
    }

    Ok(HttpResponse::build(status)
        .content_type("application/json")
        .body(body))
}

/// Forwards an edit instruction plus reference images to the generative
/// image API and relays the upstream payload.
///
/// # Input
/// - Body: `{ "prompt": "...", "image1": "<data URL>", "image2"?: "<data URL>" }`
///
/// # Output
/// - The upstream generateContent payload when it carries an image part,
///   or `{ "error": ... }` when the model replied without one
#[post("/edit")]
async fn post_edit(
    http_req: HttpRequest,
    req: web::Json<EditRequest>,
    gemini: web::Data<Arc<GeminiClient>>,
    auth: web::Data<Arc<AuthClient>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<HttpResponse> {
    let prompt = require_prompt(&req.prompt)?;
    let images = decode_images(req.image1.as_deref(), req.image2.as_deref())?;

    consume_credit_if_authenticated(&http_req, &auth, &pool).await?;

    let upstream = gemini.generate(prompt, &images, None).await?;
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = upstream
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to read upstream response: {}", e)))?;

    relay_edit_response(status, body)
}

/// Same upstream call as `/edit`, but unwraps the response down to the
/// first inline image.
///
/// # Output
/// - Success: `{ "image": { "data": "<base64>", "mimeType": "image/png" } }`
/// - Error: `{ "error": "Upstream error", "detail": ... }` for provider
///   failures, or a "no image" error when the model replied without an
///   image part
#[post("/generate")]
async fn post_generate(
    http_req: HttpRequest,
    req: web::Json<GenerateRequest>,
    gemini: web::Data<Arc<GeminiClient>>,
    auth: web::Data<Arc<AuthClient>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<HttpResponse> {
    let prompt = require_prompt(&req.prompt)?;
    let images = decode_images(req.image1.as_deref(), req.image2.as_deref())?;

    consume_credit_if_authenticated(&http_req, &auth, &pool).await?;

    let upstream = gemini.generate(prompt, &images, req.temperature).await?;
    let status = upstream.status();
    if !status.is_success() {
        let detail = upstream.text().await.unwrap_or_default();
        return Err(upstream_failure(status, &detail));
    }

    let response: gemini::GenerateContentResponse = upstream
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("Invalid upstream response: {}", e)))?;

    match gemini::extract_inline_image(&response) {
        Some(image) => Ok(HttpResponse::Ok().json(GenerateResponse {
            image: ImagePayload {
                data: image.data.clone(),
                mime_type: image.mime_type.clone(),
            },
        })),
        None => {
            log::warn!("Generative API reply carried no image part");
            Ok(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "No image returned by the model",
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use serde_json::json;

    fn bytes_of(value: serde_json::Value) -> web::Bytes {
        web::Bytes::from(serde_json::to_vec(&value).unwrap())
    }

    #[actix_web::test]
    async fn text_only_success_reply_is_not_relayed() {
        let body = bytes_of(json!({
            "candidates": [{ "content": { "parts": [{ "text": "cannot do that" }] } }]
        }));

        let res = relay_edit_response(StatusCode::OK, body).unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(res.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "No image returned by the model");
    }

    #[actix_web::test]
    async fn reply_with_image_is_relayed_verbatim() {
        let body = bytes_of(json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
            ] } }]
        }));

        let res = relay_edit_response(StatusCode::OK, body.clone()).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(to_bytes(res.into_body()).await.unwrap(), body);
    }

    #[actix_web::test]
    async fn upstream_failure_body_is_relayed_untouched() {
        let body = bytes_of(json!({ "error": { "message": "quota exceeded" } }));

        let res = relay_edit_response(StatusCode::TOO_MANY_REQUESTS, body.clone()).unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(to_bytes(res.into_body()).await.unwrap(), body);
    }

    #[test]
    fn malformed_success_body_is_an_upstream_error() {
        let res = relay_edit_response(StatusCode::OK, web::Bytes::from_static(b"not json"));
        assert!(res.is_err());
    }

    #[test]
    fn failure_message_carries_upstream_detail() {
        let err = upstream_failure(reqwest::StatusCode::SERVICE_UNAVAILABLE, "model overloaded");
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("model overloaded"));

        let bare = upstream_failure(reqwest::StatusCode::BAD_GATEWAY, "  ");
        assert!(bare.to_string().ends_with("502 Bad Gateway"));
    }
}
