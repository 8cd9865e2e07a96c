use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        Ok(Self::from_lookup(database_url, |key| std::env::var(key).ok()))
    }

    fn from_lookup(database_url: String, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("APP_PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(10),
            run_migrations: lookup("RUN_MIGRATIONS")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
