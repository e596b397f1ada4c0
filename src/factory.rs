use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::providers::bedrock::{BedrockCredentials, SdkConverseApi, DEFAULT_REGION};
use crate::providers::gemini::{GeminiAuth, HttpGenerateContentApi};
use crate::providers::{BedrockProvider, GeminiProvider, OpenAIProvider};
use crate::{ChatProvider, Error};

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Gemini,
    Bedrock,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Gemini => "gemini",
            ProviderType::Bedrock => "bedrock",
        }
    }
}

impl FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "gemini" => Ok(ProviderType::Gemini),
            "bedrock" => Ok(ProviderType::Bedrock),
            other => Err(Error::config(format!(
                "unsupported provider '{other}'. Valid values are: openai, gemini, bedrock"
            ))),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for creating providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub model: String,
    /// `None` leaves the vendor default in place.
    pub temperature: Option<f32>,
    /// OpenAI API key.
    pub api_key: Option<String>,
    /// Alternative API host (OpenAI, Gemini).
    pub base_url: Option<String>,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub gemini_auth: Option<GeminiAuth>,
    /// AWS region, `us-east-1` when unset.
    pub region: Option<String>,
    pub aws_credentials: Option<BedrockCredentials>,
}

impl ProviderConfig {
    fn empty(provider_type: ProviderType, model: String) -> Self {
        Self {
            provider_type,
            model,
            temperature: None,
            api_key: None,
            base_url: None,
            project_id: None,
            location: None,
            gemini_auth: None,
            region: None,
            aws_credentials: None,
        }
    }

    /// Create configuration for the OpenAI provider.
    pub fn openai(api_key: String, model: String) -> Self {
        Self {
            api_key: Some(api_key),
            ..Self::empty(ProviderType::OpenAI, model)
        }
    }

    /// Create configuration for Gemini on Vertex AI with Application Default Credentials.
    ///
    /// Use [`ProviderConfig::with_gemini_auth`] to pick another credential source.
    pub fn gemini(project_id: String, location: String, model: String) -> Self {
        Self {
            project_id: Some(project_id),
            location: Some(location),
            gemini_auth: Some(GeminiAuth::ApplicationDefault),
            ..Self::empty(ProviderType::Gemini, model)
        }
    }

    /// Create configuration for Gemini through the Generative Language API.
    pub fn gemini_with_api_key(api_key: String, model: String) -> Self {
        Self {
            gemini_auth: Some(GeminiAuth::ApiKey(api_key)),
            ..Self::empty(ProviderType::Gemini, model)
        }
    }

    /// Create configuration for Bedrock using the default AWS credential chain.
    pub fn bedrock(region: Option<String>, model: String) -> Self {
        Self {
            region,
            ..Self::empty(ProviderType::Bedrock, model)
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_gemini_auth(mut self, auth: GeminiAuth) -> Self {
        self.gemini_auth = Some(auth);
        self
    }

    pub fn with_aws_credentials(mut self, credentials: BedrockCredentials) -> Self {
        self.aws_credentials = Some(credentials);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// `LLM_PROVIDER` selects the vendor; see the crate docs for the
    /// variables each vendor reads. Empty variables count as unset.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok().filter(|value| !value.is_empty()))
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = lookup("LLM_PROVIDER").unwrap_or_default();
        let provider_type: ProviderType = provider.parse()?;

        // Unparseable values fall back to the vendor default.
        let temperature = lookup("TEMPERATURE").and_then(|t| t.trim().parse::<f32>().ok());

        let config = match provider_type {
            ProviderType::OpenAI => {
                let (Some(api_key), Some(model)) = (lookup("OPENAI_API_KEY"), lookup("OPENAI_MODEL"))
                else {
                    return Err(Error::config("missing OPENAI_API_KEY or OPENAI_MODEL"));
                };
                let mut config = Self::openai(api_key, model);
                config.base_url = lookup("OPENAI_BASE_URL");
                config
            }
            ProviderType::Gemini => {
                let model = lookup("GEMINI_MODEL")
                    .ok_or_else(|| Error::config("missing GEMINI_MODEL"))?;

                if let Some(api_key) = lookup("GEMINI_API_KEY") {
                    Self::gemini_with_api_key(api_key, model)
                } else {
                    let (Some(project_id), Some(location)) =
                        (lookup("GEMINI_PROJECT_ID"), lookup("GEMINI_LOCATION"))
                    else {
                        return Err(Error::config(
                            "missing GEMINI_PROJECT_ID, GEMINI_LOCATION, or GEMINI_MODEL",
                        ));
                    };

                    let auth = if let Some(token) = lookup("GEMINI_ACCESS_TOKEN") {
                        GeminiAuth::AccessToken(token)
                    } else if let Some(json) = lookup("GEMINI_CREDENTIALS_JSON") {
                        GeminiAuth::ServiceAccount(json)
                    } else {
                        GeminiAuth::ApplicationDefault
                    };
                    Self::gemini(project_id, location, model).with_gemini_auth(auth)
                }
            }
            ProviderType::Bedrock => {
                let model = lookup("BEDROCK_MODEL")
                    .ok_or_else(|| Error::config("missing BEDROCK_MODEL"))?;
                Self::bedrock(lookup("AWS_REGION"), model)
            }
        };

        Ok(config.with_temperature(temperature))
    }
}

/// Factory for creating chat providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from configuration.
    pub async fn create(config: &ProviderConfig) -> Result<Box<dyn ChatProvider>, Error> {
        if config.model.is_empty() {
            return Err(Error::config(format!(
                "model is required for the {} provider",
                config.provider_type
            )));
        }

        tracing::debug!(provider = %config.provider_type, model = %config.model, "creating chat provider");

        match config.provider_type {
            ProviderType::OpenAI => {
                let api_key = config
                    .api_key
                    .clone()
                    .ok_or_else(|| Error::config("API key required for OpenAI provider"))?;
                let provider = match &config.base_url {
                    Some(base_url) => {
                        OpenAIProvider::new_with_base_url(api_key, base_url.clone(), config.model.clone())?
                    }
                    None => OpenAIProvider::new(api_key, config.model.clone())?,
                };
                Ok(Box::new(provider.with_temperature(config.temperature)))
            }
            ProviderType::Gemini => {
                let auth = config
                    .gemini_auth
                    .clone()
                    .unwrap_or(GeminiAuth::ApplicationDefault);

                let (project_id, location) = match auth {
                    GeminiAuth::ApiKey(_) => (
                        config.project_id.clone().unwrap_or_default(),
                        config.location.clone().unwrap_or_default(),
                    ),
                    _ => {
                        let project_id = config.project_id.clone().ok_or_else(|| {
                            Error::config("Project ID required for Gemini provider")
                        })?;
                        let location = config.location.clone().ok_or_else(|| {
                            Error::config("Location required for Gemini provider")
                        })?;
                        (project_id, location)
                    }
                };

                let mut api = HttpGenerateContentApi::new(project_id, location, auth).await?;
                if let Some(base_url) = &config.base_url {
                    api = api.with_base_url(base_url.clone());
                }
                let provider = GeminiProvider::with_api(Arc::new(api), config.model.clone())
                    .with_temperature(config.temperature);
                Ok(Box::new(provider))
            }
            ProviderType::Bedrock => {
                let region = config
                    .region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REGION.to_string());
                let api = SdkConverseApi::new(region, config.aws_credentials.clone(), None).await;
                let provider = BedrockProvider::with_api(Arc::new(api), config.model.clone())
                    .with_temperature(config.temperature);
                Ok(Box::new(provider))
            }
        }
    }

    /// Create a provider from environment variables.
    pub async fn from_env() -> Result<Box<dyn ChatProvider>, Error> {
        let config = ProviderConfig::from_env()?;
        Self::create(&config).await
    }
}
