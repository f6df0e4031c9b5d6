use serde::{Deserialize, Serialize};

/// Account provider sent with login and registration requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    #[default]
    Local,
}

/// The authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: String,
}

fn default_true() -> bool {
    true
}

/// Body returned by `login` and `register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub token: String,
    pub user: User,
    #[serde(default = "default_true")]
    pub must_verify_email: bool,
    #[serde(default)]
    pub email_verified: bool,
}

/// Body returned by `GET /api/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: User,
    #[serde(default = "default_true")]
    pub must_verify_email: bool,
    #[serde(default)]
    pub email_verified: bool,
}

/// Registration form. The provider discriminator is added by the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_defaults_verification_flags() {
        let json = r#"{"token":"T","user":{"id":1,"name":"Ada","email":"a@x.com","role":"speaker"}}"#;
        let parsed: AuthTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.token, "T");
        assert!(parsed.must_verify_email);
        assert!(!parsed.email_verified);
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AuthProvider::Local).unwrap(),
            r#""local""#
        );
    }
}
