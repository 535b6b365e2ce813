use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distinguishes short-lived access tokens from long-lived refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    Access,
    Refresh,
}

impl TokenUse {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Claims carried by every issued token.
///
/// `sub` holds the user id rendered as a string; the role travels in the
/// token so handlers can gate admin routes without a second lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(rename = "use")]
    pub token_use: String,
    pub iat: i64,
    pub exp: i64,
}

/// The verified caller identity extracted from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: String,
}

/// Issues and verifies HS256 bearer tokens.
///
/// Expiry is checked manually against a caller-supplied clock instead of the
/// library's wall clock, so tests control time.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Issues a signed token for the user with the TTL of the given use.
    pub fn issue(
        &self,
        user_id: i64,
        role: &str,
        token_use: TokenUse,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = match token_use {
            TokenUse::Access => self.access_ttl,
            TokenUse::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            token_use: token_use.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(TokenError::Encode)
    }

    /// Verifies signature, use and expiry, returning the caller identity.
    pub fn verify(
        &self,
        token: &str,
        expected_use: TokenUse,
        now: DateTime<Utc>,
    ) -> Result<Identity, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(format!("{err}")))?;
        let claims = data.claims;

        if claims.token_use != expected_use.as_str() {
            return Err(TokenError::Invalid("token_use_mismatch".to_string()));
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Invalid("token_expired".to_string()));
        }
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| TokenError::Invalid("malformed_subject".to_string()))?;

        Ok(Identity {
            user_id,
            role: claims.role,
        })
    }
}

/// Errors raised while issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> TokenService {
        TokenService::new(b"test-secret", Duration::hours(1), Duration::days(7))
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn issue_then_verify_returns_identity() {
        let tokens = service();
        let token = tokens.issue(42, "user", TokenUse::Access, now()).expect("issue");

        let identity = tokens
            .verify(&token, TokenUse::Access, now())
            .expect("verify");
        assert_eq!(
            identity,
            Identity {
                user_id: 42,
                role: "user".to_string()
            }
        );
    }

    #[test]
    fn refresh_token_is_rejected_on_access_paths() {
        let tokens = service();
        let token = tokens
            .issue(42, "user", TokenUse::Refresh, now())
            .expect("issue");

        let err = tokens.verify(&token, TokenUse::Access, now()).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(reason) if reason == "token_use_mismatch"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service();
        let token = tokens.issue(42, "user", TokenUse::Access, now()).expect("issue");

        let later = now() + Duration::hours(2);
        let err = tokens.verify(&token, TokenUse::Access, later).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(reason) if reason == "token_expired"));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let tokens = service();
        let other = TokenService::new(b"other-secret", Duration::hours(1), Duration::days(7));
        let token = other.issue(42, "user", TokenUse::Access, now()).expect("issue");

        assert!(tokens.verify(&token, TokenUse::Access, now()).is_err());
    }

    #[test]
    fn role_claim_survives_the_round_trip() {
        let tokens = service();
        let token = tokens
            .issue(7, "admin", TokenUse::Access, now())
            .expect("issue");
        let identity = tokens
            .verify(&token, TokenUse::Access, now())
            .expect("verify");
        assert_eq!(identity.role, "admin");
    }
}
