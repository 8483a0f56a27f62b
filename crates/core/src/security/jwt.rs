//! # JWT Token Service
//!
//! Issues and verifies the two token kinds used by the request plane. Both
//! are HMAC-signed; verification inspects the token header first and rejects
//! any algorithm outside the HMAC family before the secret is ever consulted,
//! closing the algorithm-confusion hole where a client substitutes `none` or
//! an asymmetric scheme.

use crate::{config::JwtConfig, error::Result, Error};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub token_type: TokenKind,
    pub is_first_login: bool,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self> {
        if config.secret.len() < 32 {
            return Err(Error::internal("JWT secret must be at least 32 bytes"));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_expiry: Duration::seconds(config.access_token_expiry),
            refresh_expiry: Duration::seconds(config.refresh_token_expiry),
        })
    }

    pub fn generate_token_pair(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
        roles: Vec<String>,
        is_first_login: bool,
    ) -> Result<TokenPair> {
        let access_token = self.generate_token(
            user_id,
            username,
            email,
            roles.clone(),
            is_first_login,
            TokenKind::Access,
        )?;
        let refresh_token = self.generate_token(
            user_id,
            username,
            email,
            roles,
            is_first_login,
            TokenKind::Refresh,
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        username: &str,
        email: &str,
        roles: Vec<String>,
        is_first_login: bool,
        kind: TokenKind,
    ) -> Result<String> {
        let now = Utc::now();
        let expiry = match kind {
            TokenKind::Access => self.access_expiry,
            TokenKind::Refresh => self.refresh_expiry,
        };

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            roles,
            token_type: kind,
            is_first_login,
            exp: (now + expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal("Failed to sign token").with_detail(e.to_string()))
    }

    /// Verifies signature, expiry, algorithm family, and token kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let header = decode_header(token)
            .map_err(|e| Error::unauthenticated("Malformed token").with_detail(e.to_string()))?;

        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(Error::unauthenticated("Token algorithm rejected"));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::unauthenticated("Invalid or expired token").with_detail(e.to_string()))?;

        if data.claims.token_type != expected {
            return Err(Error::unauthenticated("Wrong token type"));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".into(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        })
        .unwrap()
    }

    #[test]
    fn rejects_short_secret() {
        let result = JwtService::new(&JwtConfig {
            secret: "tooshort".into(),
            access_token_expiry: 900,
            refresh_token_expiry: 604_800,
        });
        assert!(result.is_err());
    }

    #[test]
    fn access_token_round_trip() {
        let service = service();
        let user_id = Uuid::new_v4();
        let pair = service
            .generate_token_pair(user_id, "alice", "alice@example.com", vec!["editor".into()], false)
            .unwrap();

        let claims = service.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["editor".to_string()]);
        assert_eq!(claims.token_type, TokenKind::Access);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let service = service();
        let pair = service
            .generate_token_pair(Uuid::new_v4(), "alice", "alice@example.com", vec![], true)
            .unwrap();

        let err = service.verify(&pair.refresh_token, TokenKind::Access).unwrap_err();
        assert_eq!(err.http_status(), 401);

        assert!(service.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn rejects_non_hmac_algorithm() {
        use base64::Engine;

        let service = service();
        // Header advertising RS256; body/signature are irrelevant because the
        // algorithm family check happens before signature verification.
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let token = format!("{header}.e30.c2ln");
        let err = service.verify(&token, TokenKind::Access).unwrap_err();
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn rejects_tampered_signature() {
        let service = service();
        let pair = service
            .generate_token_pair(Uuid::new_v4(), "alice", "alice@example.com", vec![], false)
            .unwrap();
        let mut tampered = pair.access_token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(service.verify(&tampered, TokenKind::Access).is_err());
    }
}
