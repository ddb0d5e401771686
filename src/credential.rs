use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, SdkError};

/// Access credentials used to sign requests.
///
/// The `Debug` implementation redacts `secret_key` and `session_token` to
/// prevent accidental leakage in logs.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    /// Present for temporary (STS-style) credentials.
    pub session_token: Option<String>,
    /// RFC 3339 expiration of temporary credentials.
    pub expiration: Option<String>,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_expiration(mut self, expiration: impl Into<String>) -> Self {
        self.expiration = Some(expiration.into());
        self
    }

    /// Checks whether temporary credentials have expired.
    ///
    /// Credentials without an expiration never expire. An unparseable
    /// expiration counts as expired.
    pub fn is_expired(&self) -> bool {
        match &self.expiration {
            None => false,
            Some(expiration) => match chrono::DateTime::parse_from_rfc3339(expiration) {
                Ok(exp_time) => chrono::Utc::now() >= exp_time.with_timezone(&chrono::Utc),
                Err(_) => true,
            },
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Resolves [`Credentials`] from a specific source.
///
/// The executor calls [`CredentialProvider::resolve`] once per attempt, so
/// providers backed by refreshable sources are re-queried rather than
/// cached past expiration.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self) -> Result<Credentials>;
}

/// Provides credentials from explicitly specified values.
pub struct StaticProvider {
    credentials: Credentials,
}

impl StaticProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for StaticProvider {
    fn resolve(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// Provides credentials from environment variables.
///
/// Reads `CLOUD_ACCESS_KEY_ID`, `CLOUD_SECRET_ACCESS_KEY`, and the
/// optional `CLOUD_SESSION_TOKEN`.
pub struct EnvProvider;

impl CredentialProvider for EnvProvider {
    fn resolve(&self) -> Result<Credentials> {
        let access_key = env::var("CLOUD_ACCESS_KEY_ID")
            .map_err(|_| SdkError::Credential("CLOUD_ACCESS_KEY_ID not set".into()))?;
        let secret_key = env::var("CLOUD_SECRET_ACCESS_KEY")
            .map_err(|_| SdkError::Credential("CLOUD_SECRET_ACCESS_KEY not set".into()))?;

        if access_key.is_empty() || secret_key.is_empty() {
            return Err(SdkError::Credential(
                "CLOUD_ACCESS_KEY_ID or CLOUD_SECRET_ACCESS_KEY is empty".into(),
            ));
        }

        let mut credentials = Credentials::new(access_key, secret_key);
        if let Ok(token) = env::var("CLOUD_SESSION_TOKEN") {
            if !token.is_empty() {
                credentials.session_token = Some(token);
            }
        }
        Ok(credentials)
    }
}

/// Provides credentials from a profile file.
///
/// Reads `~/.cloud/credentials` in INI format. The default profile name
/// is `default`.
pub struct ProfileProvider {
    profile_name: String,
    file_path: Option<PathBuf>,
}

impl Default for ProfileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileProvider {
    /// Creates a provider that reads the `default` profile.
    pub fn new() -> Self {
        Self {
            profile_name: "default".to_string(),
            file_path: None,
        }
    }

    /// Specifies a custom profile name.
    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile_name = name.into();
        self
    }

    /// Specifies a custom file path instead of the default location.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    fn default_path() -> Result<PathBuf> {
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| SdkError::Config("cannot determine home directory".into()))?;
        Ok(PathBuf::from(home).join(".cloud").join("credentials"))
    }

    fn parse_ini(content: &str, profile: &str) -> Result<Credentials> {
        let section_header = format!("[{}]", profile);
        let mut in_section = false;
        let mut access_key = None;
        let mut secret_key = None;
        let mut session_token = None;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('[') {
                in_section = line == section_header;
                continue;
            }
            if !in_section || line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                match key {
                    "access_key_id" => access_key = Some(value.to_string()),
                    "secret_access_key" => secret_key = Some(value.to_string()),
                    "session_token" => session_token = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Ok(Credentials {
                access_key,
                secret_key,
                session_token,
                expiration: None,
            }),
            _ => Err(SdkError::Config(format!(
                "profile '{}' missing access_key_id or secret_access_key",
                profile
            ))),
        }
    }
}

impl CredentialProvider for ProfileProvider {
    fn resolve(&self) -> Result<Credentials> {
        let path = match &self.file_path {
            Some(p) => p.clone(),
            None => Self::default_path()?,
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            SdkError::Config(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse_ini(&content, &self.profile_name)
    }
}

/// Tries multiple credential providers in order and returns the first success.
pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    /// Creates a chain with the given providers.
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Creates the default credential chain: Env → Profile.
    pub fn default_chain() -> Self {
        Self {
            providers: vec![Box::new(EnvProvider), Box::new(ProfileProvider::new())],
        }
    }
}

impl CredentialProvider for ChainProvider {
    fn resolve(&self) -> Result<Credentials> {
        let mut last_err = SdkError::Credential("no credential providers configured".into());
        for provider in &self.providers {
            match provider.resolve() {
                Ok(credentials) => return Ok(credentials),
                Err(e) => last_err = e,
            }
        }
        Err(SdkError::Credential(format!(
            "all credential providers failed, last error: {}",
            last_err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_credentials() {
        let provider = StaticProvider::new(Credentials::new("test-id", "test-secret"));
        let credentials = provider.resolve().unwrap();
        assert_eq!(credentials.access_key, "test-id");
        assert_eq!(credentials.secret_key, "test-secret");
        assert!(credentials.session_token.is_none());
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let credentials = Credentials::new("AKIDEXAMPLE", "super-secret-value")
            .with_session_token("super-secret-token");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(debug.contains("****"));
        assert!(!debug.contains("super-secret-value"));
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn credentials_without_expiration_never_expire() {
        assert!(!Credentials::new("id", "secret").is_expired());
    }

    #[test]
    fn credentials_past_expiration_are_expired() {
        let credentials =
            Credentials::new("id", "secret").with_expiration("2020-01-01T00:00:00Z");
        assert!(credentials.is_expired());
    }

    #[test]
    fn credentials_future_expiration_not_expired() {
        let credentials =
            Credentials::new("id", "secret").with_expiration("2999-01-01T00:00:00Z");
        assert!(!credentials.is_expired());
    }

    #[test]
    fn credentials_unparseable_expiration_counts_as_expired() {
        let credentials = Credentials::new("id", "secret").with_expiration("not-a-date");
        assert!(credentials.is_expired());
    }

    #[test]
    fn parse_ini_default_profile() {
        let ini = r#"
[default]
access_key_id = AKIDEXAMPLE
secret_access_key = ExampleSecret123

[other]
access_key_id = other-id
secret_access_key = other-secret
"#;
        let credentials = ProfileProvider::parse_ini(ini, "default").unwrap();
        assert_eq!(credentials.access_key, "AKIDEXAMPLE");
        assert_eq!(credentials.secret_key, "ExampleSecret123");
    }

    #[test]
    fn parse_ini_named_profile_with_token() {
        let ini = r#"
[default]
access_key_id = default-id
secret_access_key = default-secret

[staging]
access_key_id = staging-id
secret_access_key = staging-secret
session_token = staging-token
"#;
        let credentials = ProfileProvider::parse_ini(ini, "staging").unwrap();
        assert_eq!(credentials.access_key, "staging-id");
        assert_eq!(credentials.session_token.as_deref(), Some("staging-token"));
    }

    #[test]
    fn parse_ini_missing_profile() {
        let ini = "[default]\naccess_key_id = id\nsecret_access_key = secret\n";
        assert!(ProfileProvider::parse_ini(ini, "nonexistent").is_err());
    }

    #[test]
    fn parse_ini_with_comments() {
        let ini = r#"
[default]
# This is a comment
access_key_id = my-id
secret_access_key = my-secret
"#;
        let credentials = ProfileProvider::parse_ini(ini, "default").unwrap();
        assert_eq!(credentials.access_key, "my-id");
    }

    #[test]
    fn chain_provider_returns_first_success() {
        let chain = ChainProvider::new(vec![Box::new(StaticProvider::new(Credentials::new(
            "chain-id",
            "chain-secret",
        )))]);
        let credentials = chain.resolve().unwrap();
        assert_eq!(credentials.access_key, "chain-id");
    }

    #[test]
    fn chain_provider_all_fail() {
        let chain = ChainProvider::new(vec![Box::new(ProfileProvider::new().with_file(
            "/nonexistent/credentials",
        ))]);
        let result = chain.resolve();
        assert!(matches!(result, Err(SdkError::Credential(_))));
    }
}
