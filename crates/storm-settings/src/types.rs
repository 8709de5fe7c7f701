//! Persisted settings shapes. These mirror `settings.json` exactly, AI keys
//! included: the control panel reads keys back to let the user edit them, so
//! nothing here is write-only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const MIN_API_KEY_LEN: usize = 10;

/// How browser instances authenticate to YouTube.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    #[default]
    Cookies,
    Profiles,
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookies => f.write_str("cookies"),
            Self::Profiles => f.write_str("profiles"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default)]
    pub login_method: LoginMethod,
    #[serde(default)]
    pub is_logged_in: bool,
}

/// The AI providers the panel knows how to configure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [Self::OpenAi, Self::Anthropic, Self::Google];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// A usable key is non-empty and long enough to plausibly be real.
    pub fn has_key(&self) -> bool {
        self.api_key.trim().len() >= MIN_API_KEY_LEN
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiProviders {
    #[serde(default = "AiProviders::default_openai")]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub google: ProviderConfig,
}

impl AiProviders {
    fn default_openai() -> ProviderConfig {
        ProviderConfig {
            base_url: Some(OPENAI_DEFAULT_BASE_URL.to_string()),
            ..ProviderConfig::default()
        }
    }

    pub fn get(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Google => &self.google,
        }
    }

    pub fn get_mut(&mut self, id: ProviderId) -> &mut ProviderConfig {
        match id {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Google => &mut self.google,
        }
    }
}

impl Default for AiProviders {
    fn default() -> Self {
        Self {
            openai: Self::default_openai(),
            anthropic: ProviderConfig::default(),
            google: ProviderConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default)]
    pub providers: AiProviders,
    #[serde(default)]
    pub default_provider: Option<ProviderId>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_base_url: Option<String>,
}

impl AiSettings {
    /// Configured means a default provider is chosen and its key is usable.
    pub fn configured(&self) -> Option<(ProviderId, &ProviderConfig)> {
        let id = self.default_provider?;
        let provider = self.providers.get(id);
        if provider.has_key() && !provider.model.trim().is_empty() {
            Some((id, provider))
        } else {
            None
        }
    }
}

/// Root of `settings.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSettings {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub ai: AiSettings,
}
