//! Environment-variable-driven configuration: the SQLite database URL and the
//! `Environment` (Production/Development) selector. Per-user scheduling/algorithm
//! preferences are **not** file config — they live in `prefs_scheduling_options` and
//! `prefs_spaced_repetition`, read through the Preferences Store ([`crate::prefs`]).

use std::fs::create_dir_all;
use std::path::PathBuf;

use etcetera::app_strategy::{AppStrategy, AppStrategyArgs, choose_app_strategy};

#[allow(clippy::missing_panics_doc)]
pub fn get_data_dir() -> PathBuf {
    let crate_name = env!("CARGO_PKG_NAME");
    if cfg!(feature = "testing") {
        let mut tmp_dir = PathBuf::from("/tmp");
        tmp_dir.push(crate_name);
        tmp_dir.push("data");
        create_dir_all(&tmp_dir).unwrap();
        return tmp_dir;
    }
    let strategy: etcetera::app_strategy::Xdg = choose_app_strategy(AppStrategyArgs {
        top_level_domain: "org".to_string(),
        author: crate_name.to_string(),
        app_name: crate_name.to_string(),
    })
    .unwrap();
    let data_dir = strategy.data_dir();
    create_dir_all(&data_dir).unwrap();
    data_dir
}

#[derive(Clone, Copy, Debug, strum_macros::Display, strum_macros::EnumString)]
pub enum Environment {
    Production,
    Development,
}

/// The two knobs the host needs to stand the engine up: where the database lives, and which
/// socket it should serve on. Both default from [`Environment`] when unset, matching the
/// documented XDG data-directory convention.
#[derive(Clone, Debug)]
pub struct EnvironmentConfig {
    pub socket_address: String,
    pub database_url: String,
}

pub fn get_env_config(env: Environment) -> EnvironmentConfig {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        let mut database_path = get_data_dir();
        database_path.push(match env {
            Environment::Production => "scheduling-main.sqlite",
            Environment::Development => "scheduling-dev.sqlite",
        });
        format!("sqlite://{}", database_path.display())
    });
    let socket_address = std::env::var("SCHEDULING_SOCKET_ADDRESS").unwrap_or_else(|_| match env {
        Environment::Production => "127.0.0.1:8080".to_string(),
        Environment::Development => "127.0.0.1:8081".to_string(),
    });

    EnvironmentConfig {
        socket_address,
        database_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_env_var_takes_precedence() {
        // SAFETY: test runs single-threaded with respect to this env var; no other test in this
        // module touches `DATABASE_URL`.
        unsafe {
            std::env::set_var("DATABASE_URL", "sqlite://explicit.sqlite");
        }
        let config = get_env_config(Environment::Development);
        assert_eq!(config.database_url, "sqlite://explicit.sqlite");
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
    }

    #[test]
    fn defaults_differ_by_environment() {
        unsafe {
            std::env::remove_var("SCHEDULING_SOCKET_ADDRESS");
        }
        let prod = get_env_config(Environment::Production);
        let dev = get_env_config(Environment::Development);
        assert_ne!(prod.socket_address, dev.socket_address);
    }
}
