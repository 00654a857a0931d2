use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::engine::TaskEngine;
use crate::error::ServiceError;
use crate::models::{Caller, Role, User};
use crate::persist::{SaveFile, UserWrite};
use crate::registry::CredentialRegistry;
use crate::settings::Settings;
use crate::uploads::UploadPolicy;

// ── JWT ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material and lifetime for session tokens.
///
/// Expiry is checked with zero leeway: once `exp` has passed the token is
/// dead, which is also the moment the revocation sweep may forget its jti.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, expiry_minutes: i64) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;

        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiry: Duration::minutes(expiry_minutes),
        }
    }

    pub fn create_token(&self, user_id: Uuid, role: Role) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| ServiceError::Internal(format!("cannot sign token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(token_data.claims)
    }
}

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub engine: TaskEngine,
    pub save_file: SaveFile,
    pub registry: CredentialRegistry,
    pub tokens: TokenKeys,
    /// Body limit for task creation.
    pub max_upload_bytes: usize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: &Settings, save_file: SaveFile, blobs: Arc<dyn BlobStore>) -> Self {
        let uploads = UploadPolicy {
            max_files: settings.max_file_uploads,
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        };
        let engine = TaskEngine::new(
            Arc::new(save_file.clone()),
            blobs,
            uploads,
            settings.task_page_size.max(1),
        );

        AppState {
            engine,
            save_file,
            registry: CredentialRegistry::new(),
            tokens: TokenKeys::new(&settings.jwt_secret, settings.jwt_expiry_minutes),
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}

// ── Passwords ──────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::Internal(format!("cannot hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Create the configured admin account if nobody has registered yet.
/// Returns whether an account was created.
pub fn ensure_default_admin(save_file: &SaveFile, settings: &Settings) -> Result<bool, ServiceError> {
    if save_file.has_users()? {
        return Ok(false);
    }

    let admin = User {
        id: Uuid::new_v4(),
        email: settings.default_admin_email.clone(),
        password_hash: hash_password(&settings.default_admin_password)?,
        role: Role::Admin,
        created_at: Utc::now(),
    };
    save_file.create_user(&admin)?;
    tracing::info!(email = %admin.email, "created default admin account");
    Ok(true)
}

// ── Middleware ─────────────────────────────────────────────────

/// Resolve the bearer token into a [`Caller`]. Rejects missing, invalid and
/// revoked tokens, and tokens whose account no longer exists.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("Missing or invalid token".into()))?;

    let claims = state
        .tokens
        .verify_token(token)
        .map_err(|_| ServiceError::Unauthorized("Invalid token".into()))?;

    if state.registry.is_revoked(&claims.jti) {
        tracing::debug!(jti = %claims.jti, "rejected revoked token");
        return Err(ServiceError::Unauthorized("Token has been revoked".into()));
    }

    let user = state
        .save_file
        .get_user(claims.sub)?
        .ok_or_else(|| ServiceError::Unauthorized("User not found".into()))?;

    request.extensions_mut().insert(Caller::new(user.id, user.role));
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

// ── Handlers ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    fn required(self) -> Result<(String, String), ServiceError> {
        let email = self.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        let password = self.password.filter(|p| !p.is_empty());
        match (email, password) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(ServiceError::Validation("Email and password are required".into())),
        }
    }
}

// POST /api/auth/register
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let (email, password) = payload.required()?;

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&password)?,
        role: Role::User,
        created_at: Utc::now(),
    };

    if state.save_file.create_user(&user)? == UserWrite::EmailTaken {
        return Err(ServiceError::Conflict("User with this email already exists".into()));
    }

    let token = state.tokens.create_token(user.id, user.role)?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "msg": "User created successfully", "access_token": token })),
    ))
}

// POST /api/auth/login
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<Value>, ServiceError> {
    let (email, password) = payload.required()?;

    let user = state
        .save_file
        .get_user_by_email(&email)?
        .filter(|u| verify_password(&password, &u.password_hash))
        .ok_or_else(|| ServiceError::Unauthorized("Bad email or password".into()))?;

    let token = state.tokens.create_token(user.id, user.role)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(json!({
        "msg": "Login successful",
        "access_token": token,
        "user_id": user.id,
        "role": user.role,
    })))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> Json<Value> {
    state.registry.revoke_until(&claims.jti, claims.exp);
    tracing::info!(jti = %claims.jti, user_id = %claims.sub, "token revoked");
    Json(json!({ "msg": "Successfully logged out" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_carries_identity() {
        let keys = TokenKeys::new("test-secret", 60);
        let id = Uuid::new_v4();
        let token = keys.create_token(id, Role::Admin).unwrap();

        let claims = keys.verify_token(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn every_token_gets_its_own_jti() {
        let keys = TokenKeys::new("test-secret", 60);
        let id = Uuid::new_v4();
        let a = keys.verify_token(&keys.create_token(id, Role::User).unwrap()).unwrap();
        let b = keys.verify_token(&keys.create_token(id, Role::User).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let ours = TokenKeys::new("ours", 60);
        let theirs = TokenKeys::new("theirs", 60);
        let token = theirs.create_token(Uuid::new_v4(), Role::Admin).unwrap();
        assert!(ours.verify_token(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new("test-secret", -10);
        let token = keys.create_token(Uuid::new_v4(), Role::User).unwrap();
        assert!(keys.verify_token(&token).is_err());
    }

    #[test]
    fn swept_revocation_never_reopens_a_token() {
        let keys = TokenKeys::new("test-secret", 60);
        let registry = CredentialRegistry::new();
        let now = Utc::now().timestamp();

        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::User,
            jti: Uuid::new_v4().to_string(),
            iat: now - 120,
            exp: now - 1,
        };
        let token = keys.sign(&claims).unwrap();

        registry.revoke_until(&claims.jti, claims.exp);
        assert_eq!(registry.purge_expired(now), 1);
        assert!(!registry.is_revoked(&claims.jti));
        assert!(keys.verify_token(&token).is_err());

        let live = Claims { jti: Uuid::new_v4().to_string(), exp: now + 60, ..claims };
        let token = keys.sign(&live).unwrap();
        registry.revoke_until(&live.jti, live.exp);
        assert_eq!(registry.purge_expired(now), 0);
        assert!(registry.is_revoked(&live.jti));
        assert!(keys.verify_token(&token).is_ok());
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not a phc string"));
    }

    #[test]
    fn default_admin_seeded_once() {
        let dir = tempfile::tempdir().unwrap();
        let save_file = SaveFile::open(dir.path().join("t.redb")).unwrap();
        let settings = Settings::default();

        assert!(ensure_default_admin(&save_file, &settings).unwrap());
        assert!(!ensure_default_admin(&save_file, &settings).unwrap());

        let admin = save_file.get_user_by_email(&settings.default_admin_email).unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(verify_password(&settings.default_admin_password, &admin.password_hash));
    }

    #[test]
    fn credentials_require_both_fields() {
        let missing = Credentials { email: Some("a@b.c".into()), password: None };
        assert!(matches!(missing.required(), Err(ServiceError::Validation(_))));

        let blank = Credentials { email: Some("  ".into()), password: Some("pw".into()) };
        assert!(matches!(blank.required(), Err(ServiceError::Validation(_))));

        let ok = Credentials { email: Some(" a@b.c ".into()), password: Some("pw".into()) };
        assert_eq!(ok.required().unwrap(), ("a@b.c".to_string(), "pw".to_string()));
    }
}
