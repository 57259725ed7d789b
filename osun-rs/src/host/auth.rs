//! JWT issue and check behind the `auth` namespace and the `jwt`
//! middleware.
//!
//! Tokens are HS256, carry a `user_id` claim, and expire an hour after
//! issue.  The signing secret is the `JWT_SECRET` configuration entry,
//! falling back to [`DEFAULT_SECRET`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::http::{Middleware, Server};
use crate::script::{Callable, Namespace};

pub const DEFAULT_SECRET: &str = "osun_secret";

/// Token lifetime in seconds.
pub const TOKEN_TTL: u64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user id must not be empty")]
    EmptyUser,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    exp: u64,
}

/// Signing and verification keys for one secret.
#[derive(Clone)]
pub struct Auth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Default for Auth {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

impl Auth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for `user` valid for [`TOKEN_TTL`] seconds.
    pub fn issue(&self, user: &str) -> Result<String, AuthError> {
        self.issue_until(user, unix_now() + TOKEN_TTL)
    }

    fn issue_until(&self, user: &str, exp: u64) -> Result<String, AuthError> {
        if user.trim().is_empty() {
            return Err(AuthError::EmptyUser);
        }
        let claims = Claims {
            user_id: user.to_owned(),
            exp,
        };
        Ok(jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Check signature and expiry; return the token's user id.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token.trim(), &self.decoding, &self.validation)?;
        Ok(data.claims.user_id)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Build the `auth` namespace.
///
/// `token(user)` and `verify(token)` use the server's keys;
/// `requireAuth()` and `requireToken()` add the `auth` and `jwt`
/// middleware to `server`.
pub fn namespace(server: &Arc<Server>) -> Namespace {
    let token = {
        let auth = server.auth();
        Callable::native1("auth.token", move |user: String| {
            auth.issue(&user).map_err(|e| e.to_string())
        })
    };
    let verify = {
        let auth = server.auth();
        Callable::native1("auth.verify", move |token: String| {
            auth.verify(&token).map_err(|e| e.to_string())
        })
    };
    let require = |name: &str, m: Middleware| {
        let server = Arc::clone(server);
        Callable::native0(name, move || {
            server.add_middleware(m);
            Ok(())
        })
    };

    Namespace::new("auth")
        .with("token", token)
        .with("verify", verify)
        .with("requireAuth", require("auth.requireAuth", Middleware::Auth))
        .with("requireToken", require("auth.requireToken", Middleware::Jwt))
}
