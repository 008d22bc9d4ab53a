//! Global tunables that can be overridden through environment variables.
//!
//! An [`EnvParam`] associates the name of an environment variable with the textual representation
//! of a default value. It is meant for internal parameters of an algorithm that are too specialized
//! to be exposed in an API but are still worth tuning, such as the maximal number of branches
//! explored when regressing through conditional effects.
//!
//! ```
//! use env_param::EnvParam;
//! static MAX_BRANCHES: EnvParam<usize> = EnvParam::new("DOC_MAX_BRANCHES", "4096");
//!
//! // environment variable not set, the default value is used
//! assert_eq!(MAX_BRANCHES.get(), 4096);
//! ```
//!
//! The value is read once, on first access. Any later change of the environment variable is ignored.
//! [`EnvParam::set`] forces the value of a parameter that was not read yet.
//!
//! ```
//! use env_param::EnvParam;
//! static FILTER: EnvParam<bool> = EnvParam::new("DOC_FILTER", "true");
//!
//! FILTER.set(false);
//! assert!(!FILTER.get());
//! // FILTER.set(true) would panic: the parameter is already initialized
//! ```
//!
//! A value of the environment variable that cannot be parsed is reported with `tracing` and the
//! default value is used instead.

use std::str::FromStr;

use once_cell::sync::OnceCell;

pub struct EnvParam<T> {
    value: OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    /// Creates a parameter initialized from the environment variable `env`, or from `default` if
    /// the variable is not set.
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: OnceCell::new(),
            env,
            default,
        }
    }

    /// Name of the environment variable.
    pub fn name(&self) -> &'static str {
        self.env
    }
}

impl<T: FromStr> EnvParam<T> {
    fn parse_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => {
                tracing::error!(param = self.env, "invalid default value \"{}\"", self.default);
                panic!("[env_param] {}: invalid default value \"{}\".", self.env, self.default)
            }
        }
    }

    fn read(&self) -> T {
        match std::env::var(self.env) {
            Ok(value) => match T::from_str(&value) {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        param = self.env,
                        "could not parse \"{value}\", using default \"{}\"",
                        self.default
                    );
                    self.parse_default()
                }
            },
            Err(std::env::VarError::NotPresent) => self.parse_default(),
            Err(err) => {
                tracing::warn!(param = self.env, "{err}, using default \"{}\"", self.default);
                self.parse_default()
            }
        }
    }

    /// Value of the parameter, read from the environment on first access.
    ///
    /// # Panics
    /// If the default value cannot be parsed.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    /// Reference to the value of the parameter, read from the environment on first access.
    ///
    /// # Panics
    /// If the default value cannot be parsed.
    pub fn get_ref(&self) -> &T {
        self.value.get_or_init(|| self.read())
    }

    /// Sets the value of the parameter.
    ///
    /// # Panics
    /// If the parameter is already initialized, which typically means that it was already read.
    pub fn set(&self, value: T) {
        if self.value.set(value).is_err() {
            panic!("Parameter {} is already initialized (i.e. was previously accessed).", self.env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value() {
        static PARAM: EnvParam<u32> = EnvParam::new("ENV_PARAM_TEST_UNSET_VARIABLE", "12");
        assert_eq!(PARAM.name(), "ENV_PARAM_TEST_UNSET_VARIABLE");
        assert_eq!(PARAM.get(), 12);
        assert_eq!(PARAM.get_ref(), &12);
    }

    #[test]
    #[should_panic]
    fn set_after_read() {
        static PARAM: EnvParam<bool> = EnvParam::new("ENV_PARAM_TEST_SET_AFTER_READ", "true");
        assert!(PARAM.get());
        PARAM.set(false);
    }

    #[test]
    #[should_panic]
    fn invalid_default() {
        static PARAM: EnvParam<usize> = EnvParam::new("ENV_PARAM_TEST_INVALID_DEFAULT", "many");
        PARAM.get();
    }
}
