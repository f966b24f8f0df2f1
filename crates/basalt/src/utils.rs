//! Utility functions for configuration and environment handling.

use std::env;
use std::str::FromStr;

/// Error type for environment variable parsing.
pub type EnvError = Box<dyn std::error::Error + Send + Sync>;

/// Read an environment variable, treating "not set" as `None`.
fn env_var(name: &str) -> Result<Option<String>, EnvError> {
    match env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(format!("{name}: {e}").into()),
    }
}

/// Parse an environment variable as a boolean, with a default value.
///
/// Valid values (case-insensitive): "true", "1", "false", "0".
/// Returns an error for any other value to prevent misconfiguration.
///
/// # Errors
///
/// Returns an error if the environment variable is set to an invalid value,
/// or if the value contains invalid Unicode.
pub fn env_bool(name: &str, default: bool) -> Result<bool, EnvError> {
    let Some(value) = env_var(name)? else {
        return Ok(default);
    };

    match value.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(format!(
            "{name}: invalid value '{value}' (expected 'true', 'false', '1', or '0')"
        )
        .into()),
    }
}

/// Parse an environment variable as a number, with a default value.
///
/// # Errors
///
/// Returns an error if the environment variable is set to an invalid value,
/// or if the value contains invalid Unicode.
pub fn env_number<T>(name: &str, default: T) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = env_var(name)? else {
        return Ok(default);
    };

    value
        .trim()
        .parse()
        .map_err(|e| format!("{name}: invalid value '{value}': {e}").into())
}

/// Read an environment variable as a string, with a default value.
///
/// # Errors
///
/// Returns an error if the value contains invalid Unicode.
pub fn env_string(name: &str, default: &str) -> Result<String, EnvError> {
    Ok(env_var(name)?.unwrap_or_else(|| default.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    pub(crate) fn with_env_var<F, R>(name: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Save original value
        let original = env::var(name).ok();

        // SAFETY: We hold ENV_MUTEX to ensure single-threaded access to env vars in tests
        unsafe {
            match value {
                Some(v) => env::set_var(name, v),
                None => env::remove_var(name),
            }
        }

        let result = f();

        // SAFETY: We hold ENV_MUTEX to ensure single-threaded access to env vars in tests
        unsafe {
            match original {
                Some(v) => env::set_var(name, v),
                None => env::remove_var(name),
            }
        }

        result
    }

    #[test]
    fn test_env_bool_true_values() {
        for value in ["true", "TRUE", "True", "1"] {
            with_env_var("BASALT_TEST_BOOL", Some(value), || {
                assert!(env_bool("BASALT_TEST_BOOL", false).unwrap());
            });
        }
    }

    #[test]
    fn test_env_bool_false_values() {
        for value in ["false", "FALSE", "False", "0"] {
            with_env_var("BASALT_TEST_BOOL", Some(value), || {
                assert!(!env_bool("BASALT_TEST_BOOL", true).unwrap());
            });
        }
    }

    #[test]
    fn test_env_bool_default_when_unset() {
        with_env_var("BASALT_TEST_BOOL_UNSET", None, || {
            assert!(env_bool("BASALT_TEST_BOOL_UNSET", true).unwrap());
            assert!(!env_bool("BASALT_TEST_BOOL_UNSET", false).unwrap());
        });
    }

    #[test]
    fn test_env_bool_invalid_value() {
        with_env_var("BASALT_TEST_BOOL", Some("yes"), || {
            let err = env_bool("BASALT_TEST_BOOL", false).unwrap_err();
            assert!(err.to_string().contains("invalid value 'yes'"));
            assert!(err.to_string().contains("BASALT_TEST_BOOL"));
            assert!(err
                .to_string()
                .contains("expected 'true', 'false', '1', or '0'"));
        });

        with_env_var("BASALT_TEST_BOOL", Some(""), || {
            let err = env_bool("BASALT_TEST_BOOL", false).unwrap_err();
            assert!(err.to_string().contains("invalid value ''"));
        });
    }

    #[test]
    fn test_env_number() {
        with_env_var("BASALT_TEST_NUM", Some("42"), || {
            assert_eq!(env_number::<u32>("BASALT_TEST_NUM", 7).unwrap(), 42);
        });

        with_env_var("BASALT_TEST_NUM", None, || {
            assert_eq!(env_number::<u16>("BASALT_TEST_NUM", 25565).unwrap(), 25565);
        });

        with_env_var("BASALT_TEST_NUM", Some("70000"), || {
            let err = env_number::<u16>("BASALT_TEST_NUM", 1).unwrap_err();
            assert!(err.to_string().contains("BASALT_TEST_NUM"));
            assert!(err.to_string().contains("'70000'"));
        });
    }

    #[test]
    fn test_env_string() {
        with_env_var("BASALT_TEST_STR", Some("custom.properties"), || {
            assert_eq!(
                env_string("BASALT_TEST_STR", "server.properties").unwrap(),
                "custom.properties"
            );
        });

        with_env_var("BASALT_TEST_STR", None, || {
            assert_eq!(
                env_string("BASALT_TEST_STR", "server.properties").unwrap(),
                "server.properties"
            );
        });
    }
}
