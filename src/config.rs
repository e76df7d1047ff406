use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Ciclo de vida de la sesión
    pub leave_on_stop: bool,
    pub leave_on_finish: bool,
    pub leave_on_empty: bool,
    pub empty_cooldown: Duration,

    // Recuperación
    pub retry_backoff: Duration,
    pub error_skip_delay: Duration,
    pub repeat_delay: Duration,
    pub reconnect_timeout: Duration,
}

/// Engine-facing subset of [`Config`] shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub leave_on_stop: bool,
    pub leave_on_finish: bool,
    pub leave_on_empty: bool,
    /// Cuánto tiempo puede quedar vacío el canal antes del teardown
    pub empty_cooldown: Duration,
    /// Espera antes de avanzar cuando no se pudo abrir un track
    pub retry_backoff: Duration,
    /// Espera antes de avanzar cuando el stream falló a mitad
    pub error_skip_delay: Duration,
    /// Espera antes de repetir el track en modo repetición
    pub repeat_delay: Duration,
    pub reconnect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 50,
            max_queue_size: 1000,
            leave_on_stop: true,
            leave_on_finish: true,
            leave_on_empty: true,
            empty_cooldown: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(1),
            error_skip_delay: Duration::from_secs(1),
            repeat_delay: Duration::from_millis(500),
            reconnect_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Cola
            default_volume: parse_var("DEFAULT_VOLUME", env("DEFAULT_VOLUME"), 50)?,
            max_queue_size: parse_var("MAX_QUEUE_SIZE", env("MAX_QUEUE_SIZE"), 1000)?,
            max_playlist_size: parse_var("MAX_PLAYLIST_SIZE", env("MAX_PLAYLIST_SIZE"), 100)?,

            // Ciclo de vida
            leave_on_stop: parse_var("LEAVE_ON_STOP", env("LEAVE_ON_STOP"), true)?,
            leave_on_finish: parse_var("LEAVE_ON_FINISH", env("LEAVE_ON_FINISH"), true)?,
            leave_on_empty: parse_var("LEAVE_ON_EMPTY", env("LEAVE_ON_EMPTY"), true)?,
            empty_cooldown: parse_duration("EMPTY_COOLDOWN", env("EMPTY_COOLDOWN"), "60s")?,

            // Recuperación
            retry_backoff: parse_duration("RETRY_BACKOFF", env("RETRY_BACKOFF"), "1s")?,
            error_skip_delay: parse_duration("ERROR_SKIP_DELAY", env("ERROR_SKIP_DELAY"), "1s")?,
            repeat_delay: parse_duration("REPEAT_DELAY", env("REPEAT_DELAY"), "500ms")?,
            reconnect_timeout: parse_duration(
                "RECONNECT_TIMEOUT",
                env("RECONNECT_TIMEOUT"),
                "10s",
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - Queue and playlist sizes must be greater than 0
    /// - The empty-channel cooldown and reconnect timeout must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.empty_cooldown.is_zero() {
            anyhow::bail!("Empty cooldown must be greater than 0");
        }

        if self.reconnect_timeout.is_zero() {
            anyhow::bail!("Reconnect timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            leave_on_stop: self.leave_on_stop,
            leave_on_finish: self.leave_on_finish,
            leave_on_empty: self.leave_on_empty,
            empty_cooldown: self.empty_cooldown,
            retry_backoff: self.retry_backoff,
            error_skip_delay: self.error_skip_delay,
            repeat_delay: self.repeat_delay,
            reconnect_timeout: self.reconnect_timeout,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Queue: {}% vol, {} tracks max, {} per playlist\n  \
            Lifecycle: leave_on_stop={}, leave_on_finish={}, leave_on_empty={} after {}\n  \
            Recovery: backoff {}, error skip {}, repeat {}, reconnect {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            self.max_playlist_size,
            self.leave_on_stop,
            self.leave_on_finish,
            self.leave_on_empty,
            humantime::format_duration(self.empty_cooldown),
            humantime::format_duration(self.retry_backoff),
            humantime::format_duration(self.error_skip_delay),
            humantime::format_duration(self.repeat_delay),
            humantime::format_duration(self.reconnect_timeout),
        )
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {key}: {value}")),
        None => Ok(default),
    }
}

fn parse_duration(key: &str, raw: Option<String>, default: &str) -> Result<Duration> {
    let value = raw.unwrap_or_else(|| default.to_string());
    humantime::parse_duration(value.trim())
        .with_context(|| format!("Duración inválida para {key}: {value}"))
}
