use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Google,
    Github,
    Oidc,
    Generic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Oidc => "oidc",
            Provider::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the backend authenticates direct (non-OAuth) sign-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginProvider {
    Db,
    Ldap,
}

impl Default for LoginProvider {
    fn default() -> Self {
        LoginProvider::Db
    }
}

/// Static OAuth2 settings for one social provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    /// Backend endpoint for the code-for-token exchange. Absent means the
    /// flow ends with the raw authorization code.
    #[serde(default)]
    pub token_url: Option<String>,
}

/// OAuth2 social-login section of the runtime config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Config {
    #[serde(default)]
    pub google: Option<OAuth2ProviderConfig>,
    #[serde(default)]
    pub github: Option<OAuth2ProviderConfig>,
}

/// OIDC settings (single configurable provider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_url: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_url: Option<String>,
}

/// Process-wide, read-only runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub oauth2: Option<OAuth2Config>,
    #[serde(default)]
    pub oidc: Option<OidcConfig>,
    #[serde(default)]
    pub login_provider: LoginProvider,
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_oauth2_enabled(&self) -> bool {
        self.oauth2.is_some()
    }

    pub fn is_google_auth_enabled(&self) -> bool {
        self.oauth2
            .as_ref()
            .is_some_and(|oauth2| oauth2.google.is_some())
    }

    pub fn is_github_auth_enabled(&self) -> bool {
        self.oauth2
            .as_ref()
            .is_some_and(|oauth2| oauth2.github.is_some())
    }

    pub fn is_oidc_enabled(&self) -> bool {
        self.oidc.is_some()
    }

    /// Resolve the unified descriptor for a provider, if it is enabled.
    ///
    /// All flow variants run off one descriptor shape; the per-provider
    /// config sections only differ in where they live in the file.
    pub fn provider_descriptor(&self, provider: Provider) -> Option<ProviderDescriptor> {
        match provider {
            Provider::Google => self
                .oauth2
                .as_ref()
                .and_then(|o| o.google.as_ref())
                .map(|c| ProviderDescriptor::from_oauth2(Provider::Google, c)),
            Provider::Github => self
                .oauth2
                .as_ref()
                .and_then(|o| o.github.as_ref())
                .map(|c| ProviderDescriptor::from_oauth2(Provider::Github, c)),
            Provider::Oidc | Provider::Generic => {
                self.oidc.as_ref().map(|c| ProviderDescriptor {
                    provider,
                    authorize_url: c.authorize_url.clone(),
                    client_id: c.client_id.clone(),
                    redirect_uri: c.redirect_url.clone(),
                    scope: c.scope.clone(),
                    response_type: "code".to_string(),
                    exchange_url: c.token_url.clone(),
                    extra_auth_params: BTreeMap::new(),
                })
            }
        }
    }
}

/// Unified provider descriptor consumed by the authorization orchestrator
///
/// One parameterized shape for every provider and flow variant, so the state
/// machine is never duplicated per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub provider: Provider,
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// OAuth2 response type, "code" for the authorization-code flow
    pub response_type: String,
    /// Backend endpoint for the code-for-token exchange, if any
    pub exchange_url: Option<String>,
    /// Provider-specific extra authorize parameters, in deterministic order
    pub extra_auth_params: BTreeMap<String, String>,
}

impl ProviderDescriptor {
    fn from_oauth2(provider: Provider, config: &OAuth2ProviderConfig) -> Self {
        Self {
            provider,
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            response_type: "code".to_string(),
            exchange_url: config.token_url.clone(),
            extra_auth_params: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "oauth2": {
            "google": {
                "authorize_url": "https://accounts.google.com/o/oauth2/v2/auth",
                "client_id": "google-client",
                "redirect_uri": "http://127.0.0.1:4700/callback",
                "scope": "openid email",
                "token_url": "http://127.0.0.1:8000/api/token"
            }
        },
        "oidc": {
            "authorize_url": "https://idp.example.com/authorize",
            "client_id": "oidc-client",
            "redirect_url": "http://127.0.0.1:4700/callback",
            "scope": "openid"
        },
        "login_provider": "ldap"
    }"#;

    #[test]
    fn test_parse_runtime_config() {
        let config = RuntimeConfig::from_json(SAMPLE).unwrap();
        assert!(config.is_oauth2_enabled());
        assert!(config.is_google_auth_enabled());
        assert!(!config.is_github_auth_enabled());
        assert!(config.is_oidc_enabled());
        assert_eq!(config.login_provider, LoginProvider::Ldap);
    }

    #[test]
    fn test_empty_config_disables_everything() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert!(!config.is_oauth2_enabled());
        assert!(!config.is_google_auth_enabled());
        assert!(!config.is_github_auth_enabled());
        assert!(!config.is_oidc_enabled());
        assert_eq!(config.login_provider, LoginProvider::Db);
    }

    #[test]
    fn test_google_descriptor() {
        let config = RuntimeConfig::from_json(SAMPLE).unwrap();
        let descriptor = config.provider_descriptor(Provider::Google).unwrap();
        assert_eq!(descriptor.provider, Provider::Google);
        assert_eq!(descriptor.client_id, "google-client");
        assert_eq!(descriptor.response_type, "code");
        assert_eq!(
            descriptor.exchange_url.as_deref(),
            Some("http://127.0.0.1:8000/api/token")
        );
    }

    #[test]
    fn test_oidc_descriptor_has_no_exchange_url() {
        let config = RuntimeConfig::from_json(SAMPLE).unwrap();
        let descriptor = config.provider_descriptor(Provider::Oidc).unwrap();
        assert_eq!(descriptor.redirect_uri, "http://127.0.0.1:4700/callback");
        assert!(descriptor.exchange_url.is_none());
    }

    #[test]
    fn test_disabled_provider_has_no_descriptor() {
        let config = RuntimeConfig::from_json(SAMPLE).unwrap();
        assert!(config.provider_descriptor(Provider::Github).is_none());
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Google.to_string(), "google");
        assert_eq!(Provider::Github.as_str(), "github");
    }
}
