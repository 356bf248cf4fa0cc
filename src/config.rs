use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// SQLite database path for the recommendation cache
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// API credential for the ranking oracle endpoint
    ///
    /// Absence disables all oracle calls (ranked selection and blind
    /// suggestions); the pipeline then runs on its rule-based fallbacks.
    /// This is a configuration choice, not an error.
    #[serde(default)]
    pub oracle_api_key: Option<String>,

    /// OpenAI-compatible chat-completions base URL
    #[serde(default = "default_oracle_base_url")]
    pub oracle_base_url: String,

    /// Model identifier sent with every oracle request
    #[serde(default = "default_oracle_model")]
    pub oracle_model: String,
}

fn default_database_path() -> String {
    "studypick.db".to_string()
}

fn default_oracle_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_oracle_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}
