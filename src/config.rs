use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres { database_url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        root: PathBuf,
        public_base: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
}

/// Credentials for the admin account seeded at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    /// `None` means mail is only logged.
    pub smtp: Option<SmtpConfig>,
    pub otp_ttl_minutes: i64,
    pub max_upload_bytes: usize,
    pub admin: Option<AdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));
        let parsed = |key: &str, default: i64| -> anyhow::Result<i64> {
            match var(key) {
                Some(v) => v
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("{key} must be an integer, got `{v}`")),
                None => Ok(default),
            }
        };

        let store = match var("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreConfig::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            "memory" => StoreConfig::Memory,
            other => bail!("STORE_BACKEND must be `postgres` or `memory`, got `{other}`"),
        };

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "triage".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "triage-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: parsed("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                root: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "uploads".into())),
                public_base: var("UPLOAD_PUBLIC_BASE").unwrap_or_else(|| "/uploads".into()),
            },
            "s3" => StorageConfig::S3 {
                endpoint: required("S3_ENDPOINT")?,
                bucket: required("S3_BUCKET")?,
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            },
            other => bail!("STORAGE_BACKEND must be `local` or `s3`, got `{other}`"),
        };

        let classifier = ClassifierConfig {
            url: var("CLASSIFIER_URL").unwrap_or_else(|| "http://127.0.0.1:8500/predict".into()),
            timeout_secs: parsed("CLASSIFIER_TIMEOUT_SECS", 30)? as u64,
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parsed("SMTP_PORT", 587)? as u16,
                username: var("SMTP_USER"),
                password: var("SMTP_PASSWORD"),
                use_tls: var("SMTP_USE_TLS")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(true),
                from_email: required("SMTP_FROM_EMAIL")?,
                from_name: var("SMTP_FROM_NAME").unwrap_or_else(|| "Support Team".into()),
            }),
            None => None,
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: var("ADMIN_NAME").unwrap_or_else(|| "System Admin".into()),
            }),
            _ => None,
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("APP_PORT", 8080)? as u16,
            store,
            jwt,
            storage,
            classifier,
            smtp,
            otp_ttl_minutes: parsed("OTP_TTL_MINUTES", 10)?,
            max_upload_bytes: (parsed("MAX_UPLOAD_MB", 20)? as usize) * 1024 * 1024,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_for_a_minimal_environment() {
        let cfg = load(&[("DATABASE_URL", "postgres://db"), ("JWT_SECRET", "s")]).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Postgres { ref database_url } if database_url == "postgres://db"));
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.jwt.refresh_ttl_minutes, 20160);
        assert!(matches!(cfg.storage, StorageConfig::Local { .. }));
        assert_eq!(cfg.classifier.timeout_secs, 30);
        assert!(cfg.smtp.is_none());
        assert!(cfg.admin.is_none());
        assert_eq!(cfg.otp_ttl_minutes, 10);
        assert_eq!(cfg.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = load(&[("STORE_BACKEND", "memory")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn s3_requires_credentials() {
        let err = load(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "s"),
            ("STORAGE_BACKEND", "s3"),
            ("S3_ENDPOINT", "http://minio:9000"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));
    }

    #[test]
    fn smtp_and_admin_seed_are_optional_blocks() {
        let cfg = load(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "s"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_FROM_EMAIL", "noreply@example.com"),
            ("SMTP_USE_TLS", "false"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "changeme1"),
        ])
        .unwrap();
        let smtp = cfg.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert!(!smtp.use_tls);
        assert_eq!(smtp.from_name, "Support Team");
        assert_eq!(cfg.admin.unwrap().name, "System Admin");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = load(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "s"),
            ("OTP_TTL_MINUTES", "ten"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("OTP_TTL_MINUTES"));
    }
}
