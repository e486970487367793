use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api_state::ApiState, error::ApiError};

/// Requires the configured gateway key, when one is set.
pub async fn api_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.api_key.as_deref() {
        let api_key = extract_api_key(&request)
            .ok_or_else(|| ApiError::Unauthorized("You have to be authenticated".to_string()))?;
        if api_key != expected {
            return Err(ApiError::Unauthorized("Invalid API key".to_string()));
        }
    }

    Ok(next.run(request).await)
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header: &str, value: &str) -> Request {
        Request::builder()
            .uri("/")
            .header(header, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn reads_key_from_either_header() {
        assert_eq!(
            extract_api_key(&request_with("X-API-Key", "secret")),
            Some("secret".to_string())
        );
        assert_eq!(
            extract_api_key(&request_with("Authorization", "Bearer secret")),
            Some("secret".to_string())
        );
        assert_eq!(extract_api_key(&request_with("Authorization", "Basic abc")), None);
    }
}
