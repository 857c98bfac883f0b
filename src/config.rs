use std::env;
use std::time::Duration;

pub struct IdentitySettings {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Hosted counter backend (Redis-over-REST). Optional: without it the server
/// runs on process-local counters.
pub struct CounterSettings {
    pub url: String,
    pub token: String,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub identity: IdentitySettings,
    pub stripe: StripeSettings,
    pub counter: Option<CounterSettings>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// Length of one usage window. All plan limits are per window.
    pub usage_window: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let identity = IdentitySettings {
            base_url: env::var("IDENTITY_API_URL")
                .unwrap_or_else(|_| "https://api.clerk.com".to_string()),
            secret_key: env::var("IDENTITY_SECRET_KEY").expect("IDENTITY_SECRET_KEY must be set"),
            webhook_secret: env::var("IDENTITY_WEBHOOK_SECRET")
                .expect("IDENTITY_WEBHOOK_SECRET must be set"),
        };

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
        };

        let counter = match (env::var("COUNTER_REST_URL"), env::var("COUNTER_REST_TOKEN")) {
            (Ok(url), Ok(token)) => Some(CounterSettings { url, token }),
            _ => None,
        };

        let jwt_issuer = env::var("JWT_ISSUER").expect("JWT_ISSUER must be set");
        let jwt_audience = env::var("JWT_AUDIENCE").expect("JWT_AUDIENCE must be set");

        let window_minutes = env::var("USAGE_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(1440);

        Config {
            database_url,
            frontend_origin,
            identity,
            stripe,
            counter,
            jwt_issuer,
            jwt_audience,
            usage_window: Duration::from_secs(window_minutes * 60),
        }
    }
}
