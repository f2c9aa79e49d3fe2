/// Shared JWT validation module for the task platform
///
/// Tokens are HS256-signed claim sets carrying a subject (the numeric user id)
/// and an expiry. Validation is a pure function of (token, secret, now).
///
/// ## Security Design
///
/// - **HS256 ONLY**: the algorithm is pinned here, never taken from the token.
///   A header declaring anything else (including `none`) is a bad signature.
/// - **Explicit clock**: callers pass `now`, so expiry is checked against the
///   same instant for the whole request and tests need no clock control.
/// - **No side effects**: nothing is cached or persisted.
///
/// ## Usage
///
/// ```rust
/// use crypto_core::jwt;
///
/// let secret = b"an-example-secret-of-at-least-32-bytes!";
/// let now = chrono::Utc::now().timestamp();
/// let token = jwt::issue_token(42, now + 3600, secret).unwrap();
///
/// let principal = jwt::validate(&token, secret, now).unwrap();
/// assert_eq!(principal.subject, 42);
/// ```
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// JWT algorithm - the only scheme accepted by the platform
pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Header `alg` value matching [`JWT_ALGORITHM`]
const JWT_ALGORITHM_NAME: &str = "HS256";

// ============================================================================
// Data Structures
// ============================================================================

/// Numeric user identifier carried in the `sub` claim
pub type UserId = i64;

/// Authenticated identity extracted from a validated token.
///
/// Lives for one request only; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub subject: UserId,
    /// Expiration time (Unix timestamp, seconds)
    pub expires_at: i64,
}

/// Token validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

/// JWT claims.
///
/// The user service historically wrote the subject as `user_id`, so that name
/// is accepted as an alias for `sub`. The subject may be a JSON number or a
/// numeric string.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(alias = "user_id", deserialize_with = "deserialize_subject")]
    pub sub: UserId,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubject {
    Number(i64),
    Text(String),
}

fn deserialize_subject<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    match RawSubject::deserialize(deserializer)? {
        RawSubject::Number(id) => Ok(id),
        RawSubject::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Token Generation
// ============================================================================

/// Sign a token for `subject` expiring at `expires_at` (Unix seconds).
pub fn issue_token(
    subject: UserId,
    expires_at: i64,
    secret: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: subject,
        exp: expires_at,
        iat: Some(chrono::Utc::now().timestamp()),
    };

    encode(
        &Header::new(JWT_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

// ============================================================================
// Token Validation
// ============================================================================

/// Validate a raw bearer token (without the `Bearer ` prefix).
///
/// ## Errors
///
/// - [`AuthError::Malformed`] if the token does not split into
///   header/claims/signature or any part fails to decode
/// - [`AuthError::BadSignature`] if the header declares an algorithm other than
///   HS256, or the signature does not verify against `secret`
/// - [`AuthError::Expired`] if `now` is at or after the `exp` claim
pub fn validate(token: &str, secret: &[u8], now: i64) -> Result<Principal, AuthError> {
    check_declared_algorithm(token)?;

    let mut validation = Validation::new(JWT_ALGORITHM);
    // Expiry is checked below against the caller's clock.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    // A present but out-of-range `exp` must reach the expiry check below.
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat => AuthError::BadSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Malformed,
        })?;

    let claims = token_data.claims;
    if now >= claims.exp {
        return Err(AuthError::Expired);
    }

    Ok(Principal {
        subject: claims.sub,
        expires_at: claims.exp,
    })
}

/// Validate against the current wall clock.
pub fn validate_now(token: &str, secret: &[u8]) -> Result<Principal, AuthError> {
    validate(token, secret, chrono::Utc::now().timestamp())
}

/// Reject any token whose header does not declare exactly HS256.
///
/// This runs before the header is handed to `jsonwebtoken`, which cannot
/// represent `alg: none` and would otherwise report it as a parse failure.
fn check_declared_algorithm(token: &str) -> Result<(), AuthError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Malformed);
    };
    if header.is_empty() || payload.is_empty() {
        return Err(AuthError::Malformed);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| AuthError::Malformed)?;
    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::Malformed)?;

    match header_json.get("alg").and_then(|alg| alg.as_str()) {
        Some(JWT_ALGORITHM_NAME) => Ok(()),
        Some(_) => Err(AuthError::BadSignature),
        None => Err(AuthError::Malformed),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-unit-test-secret";
    const NOW: i64 = 1_700_000_000;

    fn encode_with(header: &str, claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(header);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn test_valid_token_yields_principal() {
        let token = issue_token(7, NOW + 60, SECRET).unwrap();
        let principal = validate(&token, SECRET, NOW).unwrap();

        assert_eq!(principal.subject, 7);
        assert_eq!(principal.expires_at, NOW + 60);
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let token = issue_token(7, NOW, SECRET).unwrap();
        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Expired));
        assert!(validate(&token, SECRET, NOW - 1).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let token = issue_token(7, NOW + 60, b"some-other-secret").unwrap();
        assert_eq!(
            validate(&token, SECRET, NOW),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_alg_none_is_bad_signature() {
        let token = encode_with(
            r#"{"alg":"none","typ":"JWT"}"#,
            &serde_json::json!({"sub": 7, "exp": NOW + 60}),
        );
        assert_eq!(
            validate(&token, SECRET, NOW),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_missing_alg_is_malformed() {
        let token = encode_with(
            r#"{"typ":"JWT"}"#,
            &serde_json::json!({"sub": 7, "exp": NOW + 60}),
        );
        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Malformed));
    }

    #[test]
    fn test_garbage_is_malformed() {
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.@@@.###", ".."] {
            assert_eq!(
                validate(token, SECRET, NOW),
                Err(AuthError::Malformed),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn test_user_id_alias_accepted() {
        let claims = serde_json::json!({"user_id": 12, "exp": NOW + 60});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW).unwrap().subject, 12);
    }

    #[test]
    fn test_string_subject_accepted() {
        let claims = serde_json::json!({"sub": "99", "exp": NOW + 60});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW).unwrap().subject, 99);
    }

    #[test]
    fn test_missing_subject_is_malformed() {
        let claims = serde_json::json!({"exp": NOW + 60});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Malformed));
    }

    #[test]
    fn test_missing_expiry_is_malformed() {
        let claims = serde_json::json!({"sub": 7});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Malformed));
    }

    #[test]
    fn test_negative_expiry_is_expired() {
        let claims = serde_json::json!({"sub": 7, "exp": -5});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Expired));
    }

    #[test]
    fn test_zero_expiry_is_expired() {
        let claims = serde_json::json!({"sub": 7, "exp": 0});
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(validate(&token, SECRET, NOW), Err(AuthError::Expired));
    }
}
