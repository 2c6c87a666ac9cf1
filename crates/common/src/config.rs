use std::{env, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when the
/// variable is unset or does not parse.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Non-empty string value of `key`, if any.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Boolean switch: `1`, `true`, `yes` and `on` (any case) enable it.
pub fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set(key: &str, value: &str) {
        unsafe { env::set_var(key, value) };
    }

    fn unset(key: &str) {
        unsafe { env::remove_var(key) };
    }

    #[test]
    #[serial]
    fn environment_defaults_to_development() {
        unset("ENVIRONMENT");
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn environment_accepts_prod_alias() {
        set("ENVIRONMENT", "PROD");
        assert_eq!(Environment::from_env(), Environment::Production);
        assert_eq!(Environment::from_env().as_str(), "production");
        unset("ENVIRONMENT");
    }

    #[test]
    #[serial]
    fn env_or_falls_back_on_garbage() {
        set("COMMON_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("COMMON_TEST_NUMBER", 42u64), 42);

        set("COMMON_TEST_NUMBER", " 7 ");
        assert_eq!(env_or("COMMON_TEST_NUMBER", 42u64), 7);
        unset("COMMON_TEST_NUMBER");
    }

    #[test]
    #[serial]
    fn env_opt_ignores_blank_values() {
        set("COMMON_TEST_OPT", "   ");
        assert_eq!(env_opt("COMMON_TEST_OPT"), None);

        set("COMMON_TEST_OPT", "http://localhost:4317");
        assert_eq!(
            env_opt("COMMON_TEST_OPT").as_deref(),
            Some("http://localhost:4317")
        );
        unset("COMMON_TEST_OPT");
    }

    #[test]
    #[serial]
    fn env_flag_recognises_truthy_values() {
        for value in ["1", "true", "YES", "On"] {
            set("COMMON_TEST_FLAG", value);
            assert!(env_flag("COMMON_TEST_FLAG"), "{value} should enable the flag");
        }

        set("COMMON_TEST_FLAG", "0");
        assert!(!env_flag("COMMON_TEST_FLAG"));
        unset("COMMON_TEST_FLAG");
        assert!(!env_flag("COMMON_TEST_FLAG"));
    }
}
