//! Bearer-token authentication.
//!
//! HS256 JWTs verified against two shared secrets: one minted for admins,
//! one for regular users. The `role` claim selects privileges and `exp` is
//! honored. When no secrets are configured (tests, local runs) every
//! request is admitted as an anonymous requester with full access.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::domain::Requester;
use crate::AppState;

use super::error::unauthorized;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    exp: Option<i64>,
}

/// Token verifier configured with the two role secrets.
#[derive(Clone)]
pub struct Authorization {
    admin_secret: Vec<u8>,
    user_secret: Vec<u8>,
}

impl Authorization {
    pub fn new(admin_secret: impl Into<Vec<u8>>, user_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            admin_secret: admin_secret.into(),
            user_secret: user_secret.into(),
        }
    }

    /// Verify an `Authorization: Bearer <jwt>` header value and produce the
    /// requester it encodes. `None` for any malformed, unsigned, expired or
    /// otherwise unverifiable token.
    pub fn verify(&self, header: &str) -> Option<Requester> {
        let token = header.strip_prefix("Bearer ")?.trim();
        let mut segments = token.split('.');
        let header_b64 = segments.next()?;
        let payload_b64 = segments.next()?;
        let signature_b64 = segments.next()?;
        if segments.next().is_some() {
            return None;
        }

        let signed = format!("{header_b64}.{payload_b64}");
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        if !verify_signature(&self.admin_secret, &signed, &signature)
            && !verify_signature(&self.user_secret, &signed, &signature)
        {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let claims: Claims = serde_json::from_slice(&payload).ok()?;
        if let Some(exp) = claims.exp {
            if exp <= Utc::now().timestamp() {
                return None;
            }
        }
        if claims.sub.trim().is_empty() {
            return None;
        }

        let is_admin = claims.role == "admin";
        // The role claim must match the secret that signed the token, so a
        // user-secret token cannot claim the admin role.
        let expected_secret = if is_admin {
            &self.admin_secret
        } else {
            &self.user_secret
        };
        if !verify_signature(expected_secret, &signed, &signature) {
            return None;
        }

        Some(Requester::new(claims.sub.as_str().into(), is_admin))
    }
}

fn verify_signature(secret: &[u8], signed: &str, signature: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(signed.as_bytes());
    mac.verify_slice(signature).is_ok()
}

fn authenticate(state: &AppState, request: &Request) -> Option<Requester> {
    let Some(auth) = &state.auth else {
        return Some(Requester::anonymous());
    };
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    auth.verify(header)
}

/// Admin-only routes.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &request) {
        Some(requester) if requester.is_admin() || requester.user_id().is_none() => {
            request.extensions_mut().insert(requester);
            next.run(request).await
        }
        _ => unauthorized(),
    }
}

/// Routes open to any authenticated caller.
pub async fn require_user_or_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &request) {
        Some(requester) => {
            request.extensions_mut().insert(requester);
            next.run(request).await
        }
        None => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn sign(secret: &[u8], payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signed = format!("{header}.{payload}");
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(signed.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("Bearer {signed}.{signature}")
    }

    fn authz() -> Authorization {
        Authorization::new(b"admin-secret".to_vec(), b"user-secret".to_vec())
    }

    #[test]
    fn verifies_admin_token() {
        let token = sign(b"admin-secret", r#"{"sub":"boss","role":"admin"}"#);
        let requester = authz().verify(&token).unwrap();
        assert!(requester.is_admin());
        assert_eq!(requester.user_id().unwrap().as_str(), "boss");
    }

    #[test]
    fn verifies_user_token_without_admin_role() {
        let token = sign(b"user-secret", r#"{"sub":"u1","role":"user"}"#);
        let requester = authz().verify(&token).unwrap();
        assert!(!requester.is_admin());
    }

    #[test]
    fn user_secret_cannot_claim_admin_role() {
        let token = sign(b"user-secret", r#"{"sub":"u1","role":"admin"}"#);
        assert!(authz().verify(&token).is_none());
    }

    #[test]
    fn rejects_bad_signature_and_garbage() {
        let token = sign(b"wrong-secret", r#"{"sub":"u1","role":"user"}"#);
        assert!(authz().verify(&token).is_none());
        assert!(authz().verify("Bearer not.a.jwt").is_none());
        assert!(authz().verify("Basic abc").is_none());
    }

    #[test]
    fn rejects_expired_token() {
        let token = sign(b"user-secret", r#"{"sub":"u1","role":"user","exp":1}"#);
        assert!(authz().verify(&token).is_none());
    }
}
