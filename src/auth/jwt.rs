use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::Session;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Claims of an identity-provider access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verifies bearer tokens (HS256) and turns them into [`Session`]s.
pub struct SessionVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    audience: String,
}

impl SessionVerifier {
    pub fn new(secret: &str, audience: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            audience: audience.to_string(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Session> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?
            .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Auth("Invalid token subject".to_string()))?;
        let email = claims
            .email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AppError::Auth("Token has no email".to_string()))?;

        Ok(Session {
            user_id,
            email,
            display_name: claims.user_metadata.display_name,
        })
    }

    /// Mints a token for `session`; used by local tooling and tests.
    pub fn issue(&self, session: &Session, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: session.user_id.to_string(),
            email: Some(session.email.clone()),
            user_metadata: UserMetadata {
                display_name: session.display_name.clone(),
            },
            aud: self.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to issue token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            email: "creator@example.com".to_string(),
            display_name: Some("Creator".to_string()),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = SessionVerifier::new("test-secret", "authenticated");
        let session = session();

        let token = verifier.issue(&session, Duration::hours(1)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), session);
    }

    #[test]
    fn test_rejects_wrong_audience_and_secret() {
        let session = session();
        let token = SessionVerifier::new("test-secret", "anon")
            .issue(&session, Duration::hours(1))
            .unwrap();
        assert!(SessionVerifier::new("test-secret", "authenticated").verify(&token).is_err());

        let token = SessionVerifier::new("other-secret", "authenticated")
            .issue(&session, Duration::hours(1))
            .unwrap();
        assert!(matches!(
            SessionVerifier::new("test-secret", "authenticated").verify(&token),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_rejects_expired_token() {
        let verifier = SessionVerifier::new("test-secret", "authenticated");
        let token = verifier.issue(&session(), Duration::hours(-2)).unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
