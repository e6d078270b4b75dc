pub mod domain;
pub mod llm;
pub mod market;
pub mod newsletter;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use sqlx::postgres::PgConnectOptions;
    use std::fmt;

    const DEFAULT_POSTGRES_PORT: u16 = 5432;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub postgres_host: Option<String>,
        pub postgres_port: Option<u16>,
        pub postgres_user: Option<String>,
        pub postgres_password: Option<String>,
        pub postgres_db: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub llm_provider: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
        pub news_base_url: Option<String>,
        pub marketaux_api_key: Option<String>,
        pub email_sender: Option<String>,
        pub email_password: Option<String>,
        pub smtp_server: Option<String>,
        pub smtp_port: Option<u16>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: env_non_empty("DATABASE_URL"),
                postgres_host: env_non_empty("POSTGRES_HOST"),
                postgres_port: parse_env("POSTGRES_PORT")?,
                postgres_user: env_non_empty("POSTGRES_USER"),
                postgres_password: env_non_empty("POSTGRES_PASSWORD"),
                postgres_db: env_non_empty("POSTGRES_DB"),
                anthropic_api_key: env_non_empty("ANTHROPIC_API_KEY"),
                openai_api_key: env_non_empty("OPENAI_API_KEY"),
                llm_provider: env_non_empty("LLM_PROVIDER"),
                sentry_dsn: env_non_empty("SENTRY_DSN"),
                data_provider_base_url: env_non_empty("DATA_PROVIDER_BASE_URL"),
                data_provider_api_key: env_non_empty("DATA_PROVIDER_API_KEY"),
                news_base_url: env_non_empty("NEWS_BASE_URL"),
                marketaux_api_key: env_non_empty("MARKETAUX_API_KEY"),
                email_sender: env_non_empty("EMAIL_SENDER"),
                email_password: env_non_empty("EMAIL_PASSWORD"),
                smtp_server: env_non_empty("SMTP_SERVER"),
                smtp_port: parse_env("SMTP_PORT")?,
            })
        }

        fn has_database(&self) -> bool {
            self.database_url.is_some()
                || (self.postgres_host.is_some()
                    && self.postgres_user.is_some()
                    && self.postgres_password.is_some()
                    && self.postgres_db.is_some())
        }

        /// `DATABASE_URL` wins; otherwise the options are assembled from the `POSTGRES_*` parts.
        pub fn require_pg_connect_options(&self) -> anyhow::Result<PgConnectOptions> {
            if let Some(url) = &self.database_url {
                return url
                    .parse::<PgConnectOptions>()
                    .context("DATABASE_URL is not a valid Postgres URL");
            }

            let (Some(host), Some(user), Some(password), Some(db)) = (
                self.postgres_host.as_deref(),
                self.postgres_user.as_deref(),
                self.postgres_password.as_deref(),
                self.postgres_db.as_deref(),
            ) else {
                anyhow::bail!("DATABASE_URL (or POSTGRES_HOST/USER/PASSWORD/DB) is required");
            };

            Ok(PgConnectOptions::new()
                .host(host)
                .port(self.postgres_port.unwrap_or(DEFAULT_POSTGRES_PORT))
                .username(user)
                .password(password)
                .database(db))
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_data_provider_api_key(&self) -> anyhow::Result<&str> {
            self.data_provider_api_key
                .as_deref()
                .context("DATA_PROVIDER_API_KEY is required")
        }

        /// Every variable a dispatch run cannot start without, by env name.
        pub fn missing_dispatch_vars(&self) -> Vec<&'static str> {
            let mut missing = Vec::new();
            if self.email_sender.is_none() {
                missing.push("EMAIL_SENDER");
            }
            if self.email_password.is_none() {
                missing.push("EMAIL_PASSWORD");
            }
            if self.data_provider_api_key.is_none() {
                missing.push("DATA_PROVIDER_API_KEY");
            }
            if !self.has_database() {
                missing.push("DATABASE_URL");
            }
            missing
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ConfigError {
        pub missing: Vec<&'static str>,
    }

    impl fmt::Display for ConfigError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "Missing required environment variables: {}",
                self.missing.join(", ")
            )
        }
    }

    impl std::error::Error for ConfigError {}

    /// Reads `key` and parses it, treating unset or blank as `None`.
    pub fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match env_non_empty(key) {
            Some(s) => s
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} has an invalid value: {s}")),
            None => Ok(None),
        }
    }

    /// Reads `key` and parses it, falling back to `default` when unset, blank or unparsable.
    pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        env_non_empty(key)
            .and_then(|s| s.parse::<T>().ok())
            .unwrap_or(default)
    }

    pub fn env_non_empty(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

}
