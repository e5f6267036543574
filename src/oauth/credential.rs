use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::TokenResponse;

use super::endpoints::OauthTokenResponse;
use crate::error::OauthError;

/// Access tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// An access token plus the refresh token that renews it.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expiry,
        }
    }

    /// A credential that only carries a refresh token; the first use triggers a refresh.
    pub fn from_refresh_token(refresh_token: Option<String>) -> Self {
        Self::new(String::new(), refresh_token, None)
    }

    /// Builds a credential from a token endpoint response.
    ///
    /// Servers may omit the refresh token on a refresh grant; the previous one stays valid then.
    pub(crate) fn from_token_response(
        resp: &OauthTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Self {
        let refresh_token = resp
            .refresh_token()
            .map(|t| t.secret().to_string())
            .or_else(|| previous_refresh_token.map(str::to_string));
        let expiry = resp
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);
        Self::new(resp.access_token().secret().to_string(), refresh_token, expiry)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// True when the access token is present and not about to expire.
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) < expiry,
            None => true,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &(!self.access_token.is_empty()).then_some("<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Anything that can hand out a usable credential, refreshing it if needed.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Credential, OauthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn refresh_only_credential_is_not_valid() {
        let cred = Credential::from_refresh_token(Some("rt".to_string()));
        assert!(!cred.is_valid());
        assert_eq!(cred.refresh_token(), Some("rt"));
    }

    #[test]
    fn empty_refresh_token_is_dropped() {
        let cred = Credential::from_refresh_token(Some(String::new()));
        assert_eq!(cred.refresh_token(), None);
    }

    #[test]
    fn expiry_inside_skew_is_not_valid() {
        let soon = Credential::new("at", None, Some(Utc::now() + Duration::seconds(5)));
        assert!(!soon.is_valid());

        let later = Credential::new("at", None, Some(Utc::now() + Duration::minutes(5)));
        assert!(later.is_valid());

        let forever = Credential::new("at", None, None);
        assert!(forever.is_valid());
    }

    #[test]
    fn token_response_without_refresh_keeps_previous_one() {
        let resp: OauthTokenResponse = serde_json::from_value(json!({
            "access_token": "at-2",
            "token_type": "bearer",
            "expires_in": 3600
        }))
        .expect("token response");

        let cred = Credential::from_token_response(&resp, Some("rt-1"));
        assert_eq!(cred.access_token(), "at-2");
        assert_eq!(cred.refresh_token(), Some("rt-1"));
        assert!(cred.is_valid());
    }

    #[test]
    fn token_response_with_rotated_refresh_token_wins() {
        let resp: OauthTokenResponse = serde_json::from_value(json!({
            "access_token": "at-2",
            "token_type": "bearer",
            "refresh_token": "rt-2"
        }))
        .expect("token response");

        let cred = Credential::from_token_response(&resp, Some("rt-1"));
        assert_eq!(cred.refresh_token(), Some("rt-2"));
        assert_eq!(cred.expiry(), None);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cred = Credential::new("secret-at", Some("secret-rt".to_string()), None);
        let shown = format!("{cred:?}");
        assert!(!shown.contains("secret-at"));
        assert!(!shown.contains("secret-rt"));
    }
}
