//! `/api/auth/*` endpoints.

use anyhow::Result;
use cfp_types::{AuthProvider, AuthTokenResponse, MeResponse, Registration};
use serde::Serialize;
use serde_json::Value;

use crate::http::ApiClient;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    provider: AuthProvider,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    provider: AuthProvider,
    #[serde(flatten)]
    registration: &'a Registration,
}

#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn register(&self, registration: &Registration) -> Result<AuthTokenResponse> {
        let request = RegisterRequest {
            provider: AuthProvider::Local,
            registration,
        };
        self.client.post_json("/api/auth/register", &request).await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokenResponse> {
        let request = LoginRequest {
            provider: AuthProvider::Local,
            email,
            password,
        };
        self.client.post_json("/api/auth/login", &request).await
    }

    /// Validates the current token and returns the identity behind it.
    ///
    /// # Errors
    /// Returns an error when the token is rejected or the body is malformed.
    pub async fn me(&self) -> Result<MeResponse> {
        self.client.get_json("/api/auth/me").await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn logout(&self) -> Result<()> {
        let _: Value = self.client.post_empty("/api/auth/logout").await?;
        Ok(())
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn resend_verification(&self) -> Result<()> {
        let _: Value = self
            .client
            .post_empty("/api/auth/email/verification-notification")
            .await?;
        Ok(())
    }
}
