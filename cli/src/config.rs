use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "mdl.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Diagnostics {
    /// `path:line,col:code` plus a few lines of context
    Plain,
    /// codespan-reporting labels
    Rich,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Columns a tab counts for in error positions.
    pub tab_size: usize,
    /// Lines of context shown before a failing line.
    pub context_before: usize,
    /// Lines of context shown from the failing line onward.
    pub context_after: usize,
    pub diagnostics: Diagnostics,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tab_size: mdl::source::DEFAULT_TAB_SIZE,
            context_before: mdl::parser::error::CONTEXT_BEFORE,
            context_after: mdl::parser::error::CONTEXT_AFTER,
            diagnostics: Diagnostics::Plain,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    /// Load `explicit` if given (it must exist), else `mdl.toml` in the
    /// working directory if present, else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Config, String> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG);
                if !fallback.is_file() {
                    return Ok(Config::default());
                }
                fallback
            }
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let config = Config::from_toml(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn fields_are_kebab_case() {
        let config = Config::from_toml("tab-size = 8\ncontext-after = 1\ndiagnostics = \"rich\"\n").unwrap();
        assert_eq!(config.tab_size, 8);
        assert_eq!(config.context_before, 2);
        assert_eq!(config.context_after, 1);
        assert_eq!(config.diagnostics, Diagnostics::Rich);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml("tabsize = 8\n").is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join("mdl.toml");
        std::fs::write(&path, "tab-size = 2\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().tab_size, 2);
    }
}
