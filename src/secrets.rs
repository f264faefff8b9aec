//! LLM connection secrets.
//!
//! Secrets come from the environment when `AZURE_OPENAI_*` variables are set,
//! otherwise from Azure Key Vault using client-credential authentication
//! (`TENANT_ID`, `CLIENT_ID`, `CLIENT_SECRET`, `KEY_VAULT_URL`).

use crate::config::SecretNames;
use crate::error::SecretsError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, instrument};

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const VAULT_API_VERSION: &str = "7.4";

/// Everything needed to construct the chat client.
#[derive(Clone, PartialEq)]
pub struct LlmSecrets {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub model: Option<String>,
}

impl fmt::Debug for LlmSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSecrets")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("model", &self.model)
            .finish()
    }
}

/// Snapshot of the environment variables secrets may be resolved from.
///
/// Captured once in `main` so resolution itself never touches process state.
#[derive(Clone, Default)]
pub struct SecretsEnv {
    vars: HashMap<String, String>,
}

impl fmt::Debug for SecretsEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut present: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        present.sort_unstable();
        f.debug_struct("SecretsEnv").field("present", &present).finish()
    }
}

impl SecretsEnv {
    const KEYS: [&'static str; 9] = [
        "AZURE_OPENAI_API_KEY",
        "AZURE_OPENAI_ENDPOINT",
        "AZURE_OPENAI_DEPLOYMENT",
        "AZURE_OPENAI_MODEL",
        "TENANT_ID",
        "CLIENT_ID",
        "CLIENT_SECRET",
        "KEY_VAULT_URL",
        "AZURE_AUTHORITY_HOST",
    ];

    pub fn from_process() -> Self {
        let vars = Self::KEYS
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();
        SecretsEnv { vars }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        SecretsEnv {
            vars: pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &'static str) -> Result<&str, SecretsError> {
        self.get(key).ok_or(SecretsError::MissingVar(key))
    }

    /// Direct settings, when the three required `AZURE_OPENAI_*` values exist.
    fn direct(&self) -> Option<LlmSecrets> {
        Some(LlmSecrets {
            api_key: self.get("AZURE_OPENAI_API_KEY")?.to_string(),
            endpoint: self.get("AZURE_OPENAI_ENDPOINT")?.to_string(),
            deployment: self.get("AZURE_OPENAI_DEPLOYMENT")?.to_string(),
            model: self.get("AZURE_OPENAI_MODEL").map(str::to_string),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Minimal Key Vault reader authenticated with client credentials.
pub struct KeyVaultClient {
    http: reqwest::Client,
    vault_url: String,
    token: String,
}

impl KeyVaultClient {
    #[instrument(level = "info", skip_all)]
    pub async fn connect(env: &SecretsEnv) -> Result<Self, SecretsError> {
        let tenant = env.require("TENANT_ID")?;
        let client_id = env.require("CLIENT_ID")?;
        let client_secret = env.require("CLIENT_SECRET")?;
        let vault_url = env.require("KEY_VAULT_URL")?.trim_end_matches('/').to_string();
        let authority = env
            .get("AZURE_AUTHORITY_HOST")
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
            .trim_end_matches('/');

        let http = reqwest::Client::new();
        let token_url = format!("{authority}/{}/oauth2/v2.0/token", urlencoding::encode(tenant));
        let response = http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", VAULT_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| SecretsError::Token(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SecretsError::Token(format!("HTTP {}", response.status().as_u16())));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SecretsError::Token(e.to_string()))?;

        info!(%vault_url, "Authenticated against Key Vault");
        Ok(KeyVaultClient {
            http,
            vault_url,
            token: token.access_token,
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn secret(&self, name: &str) -> Result<String, SecretsError> {
        let fail = |message: String| SecretsError::Secret {
            name: name.to_string(),
            message,
        };
        let url = format!(
            "{}/secrets/{}?api-version={VAULT_API_VERSION}",
            self.vault_url,
            urlencoding::encode(name)
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status().as_u16())));
        }
        let bundle: SecretBundle = response.json().await.map_err(|e| fail(e.to_string()))?;
        Ok(bundle.value)
    }
}

/// Resolve the LLM secrets, preferring direct environment settings over Key Vault.
#[instrument(level = "info", skip_all)]
pub async fn resolve(env: &SecretsEnv, names: &SecretNames) -> Result<LlmSecrets, SecretsError> {
    if let Some(secrets) = env.direct() {
        info!("Using LLM settings from environment");
        return Ok(secrets);
    }

    let vault = KeyVaultClient::connect(env).await?;
    let secrets = LlmSecrets {
        api_key: vault.secret(&names.api_key).await?,
        endpoint: vault.secret(&names.endpoint).await?,
        deployment: vault.secret(&names.deployment).await?,
        model: Some(vault.secret(&names.model).await?),
    };
    info!(deployment = %secrets.deployment, "Fetched LLM settings from Key Vault");
    Ok(secrets)
}
