//! Environment module for workflow definitions
//!
//! Definitions may read operator settings such as wordlist or template
//! locations through `env.get(name, default?)`, `env.require(name)` and
//! `env.has(name)`. What is visible is decided by a `VarProvider`:
//! - Runner/orchestrator: `ProcessEnv`, restricted to `ARGUS_*` variables
//! - Tests: a plain `HashMap`

use mlua::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for providing variables to definitions
///
/// Implementations must be Send + Sync to work with Lua's threading model.
pub trait VarProvider: Send + Sync {
    /// Get a variable by name
    fn get(&self, name: &str) -> Option<String>;
}

impl VarProvider for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Process environment, limited to variables prefixed with `ARGUS_`
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv;

impl ProcessEnv {
    const PREFIX: &'static str = "ARGUS_";
}

impl VarProvider for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        if !name.starts_with(Self::PREFIX) {
            return None;
        }
        std::env::var(name).ok()
    }
}

/// The `env` global table
pub struct EnvModule {
    provider: Arc<dyn VarProvider>,
}

impl EnvModule {
    pub fn new(provider: impl VarProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Registers the `env` table into a Lua state
    pub fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env_table = lua.create_table()?;

        // env.get(name, default?)
        {
            let provider = Arc::clone(&self.provider);
            env_table.set(
                "get",
                lua.create_function(move |_, (name, default): (String, Option<String>)| {
                    Ok(provider.get(&name).or(default))
                })?,
            )?;
        }

        // env.require(name) - errors if missing
        {
            let provider = Arc::clone(&self.provider);
            env_table.set(
                "require",
                lua.create_function(move |_, name: String| {
                    provider.get(&name).ok_or_else(|| {
                        LuaError::RuntimeError(format!(
                            "Required environment variable '{}' is not set",
                            name
                        ))
                    })
                })?,
            )?;
        }

        // env.has(name)
        {
            let provider = Arc::clone(&self.provider);
            env_table.set(
                "has",
                lua.create_function(move |_, name: String| Ok(provider.get(&name).is_some()))?,
            )?;
        }

        lua.globals().set("env", env_table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::create_sandbox;

    fn lua_with(vars: &[(&str, &str)]) -> Lua {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lua = create_sandbox().unwrap();
        EnvModule::new(map).register(&lua).unwrap();
        lua
    }

    #[test]
    fn test_env_get_with_default() {
        let lua = lua_with(&[("ARGUS_WORDLIST", "/opt/words.txt")]);

        let value: String = lua.load(r#"return env.get("ARGUS_WORDLIST")"#).eval().unwrap();
        assert_eq!(value, "/opt/words.txt");

        let value: String = lua
            .load(r#"return env.get("ARGUS_MISSING", "fallback")"#)
            .eval()
            .unwrap();
        assert_eq!(value, "fallback");

        let value: Option<String> = lua.load(r#"return env.get("ARGUS_MISSING")"#).eval().unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_env_require_missing_fails() {
        let lua = lua_with(&[]);

        let result: LuaResult<String> = lua.load(r#"return env.require("ARGUS_TOKEN")"#).eval();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("ARGUS_TOKEN"));
    }

    #[test]
    fn test_env_has() {
        let lua = lua_with(&[("ARGUS_SET", "1")]);

        let has: bool = lua.load(r#"return env.has("ARGUS_SET")"#).eval().unwrap();
        assert!(has);
        let has: bool = lua.load(r#"return env.has("ARGUS_UNSET")"#).eval().unwrap();
        assert!(!has);
    }

    #[test]
    fn test_process_env_ignores_unprefixed() {
        assert_eq!(ProcessEnv.get("PATH"), None);
    }
}
