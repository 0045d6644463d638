//! Application configuration

use anyhow::Result;

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the server listens on
    pub bind_addr: String,
    /// Development override: when set, admission and authorization checks
    /// pass everything through. Must be disabled in any deployed instance.
    pub dev_mode: bool,
    /// Path prefixes reachable without authentication
    pub public_paths: Vec<String>,
    /// Client IPs admitted to public paths; "*" matches every client
    pub allowed_ips: Vec<String>,
}

impl AppConfig {
    /// Create a new AppConfig from environment variables
    ///
    /// # Environment Variables
    /// - `BIND_ADDR`: listen address (default: "0.0.0.0:3000")
    /// - `APP_ENV`: "development" enables the development override
    /// - `PUBLIC_PATHS`: comma-separated path prefixes (default: login,
    ///   auth and static asset prefixes)
    /// - `ALLOWED_IPS`: comma-separated client IPs (default: "*")
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let dev_mode = std::env::var("APP_ENV")
            .map(|env| env == "development")
            .unwrap_or(false);

        let public_paths = std::env::var("PUBLIC_PATHS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| default_public_paths());

        let allowed_ips = std::env::var("ALLOWED_IPS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(AppConfig {
            bind_addr,
            dev_mode,
            public_paths,
            allowed_ips,
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn default_public_paths() -> Vec<String> {
    [
        "/login",
        "/health",
        "/auth/login",
        "/auth/logout",
        "/auth/register",
        "/stylesheets/",
        "/fonts/",
        "/images/",
        "/javascripts/",
    ]
    .iter()
    .map(|path| path.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_app_config_defaults() {
        unsafe {
            std::env::remove_var("BIND_ADDR");
            std::env::remove_var("APP_ENV");
            std::env::remove_var("PUBLIC_PATHS");
            std::env::remove_var("ALLOWED_IPS");
        }

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(!config.dev_mode);
        assert!(config.public_paths.contains(&"/auth/login".to_string()));
        assert_eq!(config.allowed_ips, vec!["*".to_string()]);
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        unsafe {
            std::env::set_var("APP_ENV", "development");
            std::env::set_var("PUBLIC_PATHS", "/open, /also-open");
            std::env::set_var("ALLOWED_IPS", "10.0.0.1,10.0.0.2");
        }

        let config = AppConfig::from_env().unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.public_paths, vec!["/open", "/also-open"]);
        assert_eq!(config.allowed_ips, vec!["10.0.0.1", "10.0.0.2"]);

        unsafe {
            std::env::remove_var("APP_ENV");
            std::env::remove_var("PUBLIC_PATHS");
            std::env::remove_var("ALLOWED_IPS");
        }
    }
}
