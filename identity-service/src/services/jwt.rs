use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Signs and verifies RS256 access tokens. Refresh tokens are opaque and
/// never pass through here.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID
    pub sub: String,
    pub org_id: String,
    /// Session ID
    pub sid: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Who an access token is minted for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;
        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        Self::from_pem(
            private_key_pem.as_bytes(),
            public_key_pem.as_bytes(),
            config.access_token_expiry_minutes,
        )
    }

    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        access_token_expiry_minutes: i64,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        tracing::info!("JWT service initialized with RS256 keys");

        Ok(Self {
            encoding_key,
            decoding_key,
            access_token_expiry_minutes,
        })
    }

    pub fn generate_access_token(
        &self,
        subject: &TokenSubject,
        session_id: Uuid,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: subject.user_id.to_string(),
            org_id: subject.organization_id.to_string(),
            sid: session_id.to_string(),
            email: subject.email.clone(),
            role: subject.role.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/jwt_public.pem");

    fn service(expiry_minutes: i64) -> JwtService {
        JwtService::from_pem(PRIVATE_KEY.as_bytes(), PUBLIC_KEY.as_bytes(), expiry_minutes)
            .expect("test keys parse")
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "owner@acme.test".to_string(),
            role: "admin".to_string(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = service(15);
        let subject = subject();
        let session_id = Uuid::new_v4();

        let token = jwt.generate_access_token(&subject, session_id).unwrap();
        let claims = jwt.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, subject.user_id.to_string());
        assert_eq!(claims.org_id, subject.organization_id.to_string());
        assert_eq!(claims.sid, session_id.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_token_rejected() {
        // Past the default 60s leeway.
        let jwt = service(-5);
        let token = jwt.generate_access_token(&subject(), Uuid::new_v4()).unwrap();
        assert!(jwt.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = service(15);
        let token = jwt.generate_access_token(&subject(), Uuid::new_v4()).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(jwt.validate_access_token(&tampered).is_err());
        assert!(jwt.validate_access_token("not-a-jwt").is_err());
    }

    #[test]
    fn test_missing_key_file() {
        let config = JwtConfig {
            private_key_path: "/nonexistent/private.pem".to_string(),
            public_key_path: "/nonexistent/public.pem".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 30,
        };
        assert!(JwtService::new(&config).is_err());
    }
}
