// ============================================================================
// PROVIDER PAYLOAD: form-encoded heal request, JSON heal response
// ============================================================================
//
// Token exchange (API key + secret key -> access token):
//   grant_type=client_credentials&client_id=<AK>&client_secret=<SK>
//   {"access_token": "...", "expires_in": N}      on success
//   {"error": "...", "error_description": "..."}  on failure
// Request body (POSTed to <endpoint>?access_token=<token>):
//   image=<urlencoded base64 PNG>&rectangle=[{"left":L,"top":T,"width":W,"height":H}]
// Response:
//   {"image": "<base64>"}                         on success
//   {"error_code": N, "error_msg": "..."}         on rejection

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;

use crate::canvas::{PixelBuffer, Region};
use crate::error::EditResult;
use crate::io::{decode_image, encode_png};
use crate::ops::healing::{HealingProvider, HealingProviderConfig, ProviderError};

/// Build the form body for a heal request.
pub fn encode_request(image: &PixelBuffer, region: Region) -> EditResult<String> {
    let png = encode_png(image)?;
    let b64 = BASE64_STANDARD.encode(png);
    let rect = serde_json::to_string(&region)?;
    Ok(format!("image={}&rectangle=[{}]", urlencoding::encode(&b64), rect))
}

/// Query string for the token exchange.
pub fn token_query(config: &HealingProviderConfig) -> String {
    format!(
        "grant_type=client_credentials&client_id={}&client_secret={}",
        urlencoding::encode(&config.api_key),
        urlencoding::encode(&config.secret_key)
    )
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Pull the access token out of a token-exchange response body.
pub fn decode_token_response(body: &str) -> Result<String, ProviderError> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Unavailable(format!("malformed token response: {}", e)))?;
    match response.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ProviderError::Unavailable(format!(
            "token refused: {}",
            response
                .error_description
                .or(response.error)
                .unwrap_or_else(|| "no access_token in response".to_string())
        ))),
    }
}

/// Heal endpoint with the access token attached.
pub fn heal_url(config: &HealingProviderConfig, access_token: &str) -> String {
    let sep = if config.endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}access_token={}", config.endpoint, sep, urlencoding::encode(access_token))
}

/// Raw provider response. Either `image` or the error pair is present.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HealResponse {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// Parse a response body into a healed buffer of the `expected` size.
pub fn decode_response(body: &str, expected: (u32, u32)) -> Result<PixelBuffer, ProviderError> {
    let response: HealResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Unavailable(format!("malformed response: {}", e)))?;

    if let Some(code) = response.error_code {
        return Err(ProviderError::Rejected {
            code,
            message: response.error_msg.unwrap_or_default(),
        });
    }

    let Some(b64) = response.image else {
        return Err(ProviderError::Rejected {
            code: -1,
            message: "response carried no image".to_string(),
        });
    };
    let bytes = BASE64_STANDARD
        .decode(b64.trim())
        .map_err(|e| ProviderError::Rejected { code: -1, message: format!("bad base64: {}", e) })?;
    let healed = decode_image(&bytes).map_err(|e| ProviderError::Rejected { code: -1, message: e.to_string() })?;

    if healed.dimensions() != expected {
        return Err(ProviderError::Rejected {
            code: -1,
            message: format!(
                "healed image is {}x{}, expected {}x{}",
                healed.width(),
                healed.height(),
                expected.0,
                expected.1
            ),
        });
    }
    Ok(healed)
}

/// The network hops: exchange credentials for a token, then POST a form body
/// to [`heal_url`] and return the response body.
pub trait FormTransport: Send + Sync {
    fn fetch_token(&self, config: &HealingProviderConfig) -> Result<String, ProviderError>;

    fn post_form(
        &self,
        config: &HealingProviderConfig,
        access_token: &str,
        body: &str,
    ) -> Result<String, ProviderError>;
}

/// A [`HealingProvider`] speaking the form/JSON wire shape over any transport.
pub struct FormHealingProvider<T: FormTransport> {
    transport: T,
}

impl<T: FormTransport> FormHealingProvider<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: FormTransport> HealingProvider for FormHealingProvider<T> {
    fn name(&self) -> &str {
        "form"
    }

    fn heal(
        &self,
        image: &PixelBuffer,
        region: Region,
        config: &HealingProviderConfig,
    ) -> Result<PixelBuffer, ProviderError> {
        if config.endpoint.is_empty() {
            return Err(ProviderError::Unavailable("no endpoint configured".to_string()));
        }
        if config.api_key.is_empty() || config.secret_key.is_empty() {
            return Err(ProviderError::Unavailable("no API key / secret key configured".to_string()));
        }
        let token = match self.transport.fetch_token(config) {
            Ok(token) => token,
            Err(ProviderError::Unavailable(msg)) => return Err(ProviderError::Unavailable(msg)),
            Err(e) => return Err(ProviderError::Unavailable(format!("token exchange failed: {}", e))),
        };
        let body = encode_request(image, region)
            .map_err(|e| ProviderError::Unavailable(format!("could not encode request: {}", e)))?;
        let response = self.transport.post_form(config, &token, &body)?;
        decode_response(&response, image.dimensions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn region() -> Region {
        Region { left: 5, top: 6, width: 7, height: 8 }
    }

    fn response_for(image: &PixelBuffer) -> String {
        let b64 = BASE64_STANDARD.encode(encode_png(image).unwrap());
        serde_json::json!({ "image": b64 }).to_string()
    }

    /// Records the requests and answers with canned bodies.
    struct Canned {
        token: Result<String, ProviderError>,
        reply: Result<String, ProviderError>,
        token_requests: Mutex<usize>,
        seen: Mutex<Option<(String, String)>>,
    }

    impl Canned {
        fn new(reply: Result<String, ProviderError>) -> Self {
            Self {
                token: Ok("tok-123".to_string()),
                reply,
                token_requests: Mutex::new(0),
                seen: Mutex::new(None),
            }
        }
    }

    impl FormTransport for Canned {
        fn fetch_token(&self, _: &HealingProviderConfig) -> Result<String, ProviderError> {
            *self.token_requests.lock().unwrap() += 1;
            self.token.clone()
        }

        fn post_form(&self, _: &HealingProviderConfig, token: &str, body: &str) -> Result<String, ProviderError> {
            *self.seen.lock().unwrap() = Some((token.to_string(), body.to_string()));
            self.reply.clone()
        }
    }

    fn config() -> HealingProviderConfig {
        HealingProviderConfig::new("https://heal.invalid/inpaint").with_credentials("ak", "sk")
    }

    #[test]
    fn request_carries_image_and_rectangle() {
        let img = PixelBuffer::filled(2, 2, [1, 2, 3, 255]);
        let body = encode_request(&img, region()).unwrap();

        assert!(body.ends_with(r#"&rectangle=[{"left":5,"top":6,"width":7,"height":8}]"#));
        let encoded = body.strip_prefix("image=").unwrap().split('&').next().unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        let b64 = urlencoding::decode(encoded).unwrap();
        let png = BASE64_STANDARD.decode(b64.as_bytes()).unwrap();
        assert_eq!(decode_image(&png).unwrap(), img);
    }

    #[test]
    fn error_response_is_a_rejection() {
        let err = decode_response(r#"{"error_code":110,"error_msg":"Access token invalid"}"#, (2, 2)).unwrap_err();
        assert_eq!(err, ProviderError::Rejected { code: 110, message: "Access token invalid".into() });
    }

    #[test]
    fn garbage_response_is_unavailable() {
        assert!(matches!(decode_response("<html>502</html>", (2, 2)), Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn wrong_size_is_rejected() {
        let body = response_for(&PixelBuffer::filled(3, 3, [0, 0, 0, 255]));
        assert!(matches!(decode_response(&body, (2, 2)), Err(ProviderError::Rejected { code: -1, .. })));
    }

    #[test]
    fn provider_round_trips_through_transport() {
        let healed = PixelBuffer::filled(4, 4, [20, 30, 40, 255]);
        let provider = FormHealingProvider::new(Canned::new(Ok(response_for(&healed))));

        let out = provider.heal(&PixelBuffer::filled(4, 4, [0; 4]), region(), &config()).unwrap();

        assert_eq!(out, healed);
        assert_eq!(*provider.transport.token_requests.lock().unwrap(), 1);
        let (token, body) = provider.transport.seen.lock().unwrap().clone().unwrap();
        assert_eq!(token, "tok-123");
        assert!(body.starts_with("image="));
    }

    #[test]
    fn missing_endpoint_is_unavailable() {
        let provider = FormHealingProvider::new(Canned::new(Ok(String::new())));
        let err = provider
            .heal(&PixelBuffer::filled(1, 1, [0; 4]), region(), &HealingProviderConfig::new(""))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(provider.transport.seen.lock().unwrap().is_none());
    }

    #[test]
    fn missing_credentials_skip_the_network() {
        let provider = FormHealingProvider::new(Canned::new(Ok(String::new())));
        let bare = HealingProviderConfig::new("https://heal.invalid/inpaint");

        let err = provider.heal(&PixelBuffer::filled(1, 1, [0; 4]), region(), &bare).unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(*provider.transport.token_requests.lock().unwrap(), 0);
    }

    #[test]
    fn failed_token_exchange_is_unavailable_and_stops_the_heal() {
        let mut transport = Canned::new(Ok(String::new()));
        transport.token = Err(ProviderError::Rejected { code: 401, message: "unknown client id".into() });
        let provider = FormHealingProvider::new(transport);

        let err = provider.heal(&PixelBuffer::filled(1, 1, [0; 4]), region(), &config()).unwrap_err();

        match err {
            ProviderError::Unavailable(msg) => assert!(msg.contains("unknown client id")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert!(provider.transport.seen.lock().unwrap().is_none());
    }

    #[test]
    fn token_exchange_wire_shape() {
        let cfg = HealingProviderConfig::new("https://heal.invalid/inpaint").with_credentials("a k", "s&k");
        assert_eq!(token_query(&cfg), "grant_type=client_credentials&client_id=a%20k&client_secret=s%26k");
        assert_eq!(heal_url(&cfg, "t/1"), "https://heal.invalid/inpaint?access_token=t%2F1");

        let with_query = HealingProviderConfig::new("https://heal.invalid/inpaint?v=2");
        assert_eq!(heal_url(&with_query, "t"), "https://heal.invalid/inpaint?v=2&access_token=t");

        assert_eq!(decode_token_response(r#"{"access_token":"abc","expires_in":2592000}"#).unwrap(), "abc");
        let refused = decode_token_response(r#"{"error":"invalid_client","error_description":"unknown client id"}"#);
        assert_eq!(refused.unwrap_err(), ProviderError::Unavailable("token refused: unknown client id".into()));
    }
}
