use rocket::figment::Figment;
use rocket::figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Environment variables read without a prefix.
const RAW_ENV_KEYS: &[&str] = &[
    "DATABASE_URL",
    "AUTO_LOGOUT_DELAY",
    "LOG_DIR",
    "STATIC_DIR",
    "LOG_PAGE_VIEWS",
    "STOCK_ALERT_THRESHOLD",
    "ADMIN_PASSWORD",
];

/// Application settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: String,
    /// Inactivity window in seconds before a session is force-expired.
    pub auto_logout_delay: i64,
    pub log_dir: String,
    /// Directory served under `/static`.
    pub static_dir: String,
    pub log_page_views: bool,
    /// Route-name substrings never recorded as page views.
    pub view_log_skip: Vec<String>,
    pub stock_alert_threshold: i32,
    /// Password given to the bootstrap `admin` account on an empty database.
    pub admin_password: String,
}

impl Settings {
    /// Defaults, then `vetdesk.toml`, then `VETDESK_*` and the raw variables above.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("vetdesk.toml"))
            .merge(Env::prefixed("VETDESK_"))
            .merge(Env::raw().only(RAW_ENV_KEYS))
    }

    pub fn load() -> anyhow::Result<Self> {
        let settings: Settings = Self::figment().extract()?;
        if settings.auto_logout_delay <= 0 {
            anyhow::bail!("AUTO_LOGOUT_DELAY must be a positive number of seconds");
        }
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "vetdesk.db".to_string(),
            auto_logout_delay: 1800,
            log_dir: "logs".to_string(),
            static_dir: "static".to_string(),
            log_page_views: true,
            view_log_skip: ["static", "media", "favicon", "robots", "sitemap", "health"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stock_alert_threshold: 10,
            admin_password: "pass1234".to_string(),
        }
    }
}
