use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub app_base_url: String,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub db: DbConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub directory: DirectoryConfig,
    pub stripe: StripeConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u8,
    pub key_prefix: String,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub access_expiry_secs: i64,
    pub refresh_expiry_secs: i64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub submission_max: u32,
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub cache_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub connect_return_path: String,
    pub connect_refresh_path: String,
    pub checkout_success_path: String,
    pub checkout_cancel_path: String,
}

const DEFAULT_JWT_SECRET: &str = "change-me-to-a-secure-random-string";

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or_parse("PORT", 8080),
            app_env: env_or("APP_ENV", "development"),
            app_base_url: env_or("APP_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            store_backend: parse_store_backend(&env_or("STORE_BACKEND", "postgres")),
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "courtly"),
                user: env_or("DB_USER", "courtly"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 2),
                pool_max: env_or_parse("DB_POOL_MAX", 20),
            },
            redis: RedisConfig {
                enabled: env_or_parse("REDIS_ENABLED", true),
                host: env_or("REDIS_HOST", "localhost"),
                port: env_or_parse("REDIS_PORT", 6379),
                password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
                db: env_or_parse("REDIS_DB", 0),
                key_prefix: "courtly:".to_string(),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
                access_expiry_secs: parse_duration_to_secs(&env_or("JWT_ACCESS_EXPIRY", "1h")),
                refresh_expiry_secs: parse_duration_to_secs(&env_or("JWT_REFRESH_EXPIRY", "30d")),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 120),
                submission_max: env_or_parse("RATE_LIMIT_SUBMISSIONS", 10),
            },
            directory: DirectoryConfig {
                cache_seconds: env_or_parse("DIRECTORY_CACHE_SEC", 60),
            },
            stripe: StripeConfig {
                secret_key: env_or("STRIPE_SECRET_KEY", ""),
                webhook_secret: env_or("STRIPE_WEBHOOK_SECRET", ""),
                currency: env_or("STRIPE_CURRENCY", "usd").to_lowercase(),
                connect_return_path: env_or(
                    "STRIPE_CONNECT_RETURN_PATH",
                    "/dashboard/club/billing?onboarding=complete",
                ),
                connect_refresh_path: env_or(
                    "STRIPE_CONNECT_REFRESH_PATH",
                    "/dashboard/club/billing?onboarding=refresh",
                ),
                checkout_success_path: env_or(
                    "STRIPE_CHECKOUT_SUCCESS_PATH",
                    "/dashboard?membership=success",
                ),
                checkout_cancel_path: env_or(
                    "STRIPE_CHECKOUT_CANCEL_PATH",
                    "/dashboard?membership=cancelled",
                ),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Settings that leave a deployment open to forged tokens or webhooks.
    pub fn insecure_settings(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.jwt.secret.is_empty() || self.jwt.secret == DEFAULT_JWT_SECRET {
            issues.push("JWT_SECRET is empty or still the default");
        }
        if !self.stripe.secret_key.is_empty() && self.stripe.webhook_secret.is_empty() {
            issues.push("STRIPE_WEBHOOK_SECRET is empty; Stripe webhooks will be refused");
        }
        issues
    }

    /// Refuses to run production with insecure settings; elsewhere they are
    /// only logged.
    pub fn validate(&self) -> Result<(), String> {
        let issues = self.insecure_settings();
        if issues.is_empty() {
            return Ok(());
        }
        if self.is_production() {
            return Err(format!("insecure production config: {}", issues.join("; ")));
        }
        for issue in issues {
            tracing::warn!("{issue}");
        }
        Ok(())
    }

    /// Absolute URL on the web app for a path such as `/dashboard`.
    pub fn app_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.app_base_url, path.trim_start_matches('/'))
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }

    pub fn redis_url(&self) -> String {
        if let Ok(url) = env::var("REDIS_URL") {
            return url;
        }
        match &self.redis.password {
            Some(pw) if !pw.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                pw, self.redis.host, self.redis.port, self.redis.db
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.redis.host, self.redis.port, self.redis.db
            ),
        }
    }
}

fn parse_store_backend(s: &str) -> StoreBackend {
    match s.trim().to_lowercase().as_str() {
        "memory" | "in-memory" => StoreBackend::Memory,
        _ => StoreBackend::Postgres,
    }
}

fn parse_duration_to_secs(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 3600;
    }
    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: i64 = num_str.parse().unwrap_or(1);
    match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => s.parse().unwrap_or(3600),
    }
}
