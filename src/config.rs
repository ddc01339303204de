use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::LowerError;

/// Lowering options, read from a `lower.toml`-style file.
///
/// ```toml
/// [lowering]
/// char_comparison = true
/// binary_adapters = true
///
/// [naming]
/// temp_prefix = "$tmpVar$"
/// ctor_ref_prefix = "ctorRef$"
/// extension_bridge_prefix = "dgsm$$"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct LowerConfig {
    pub lowering: LoweringOptions,
    pub naming: NamingOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoweringOptions {
    /// Rewrite single-character string constants in comparisons to chars.
    pub char_comparison: bool,
    /// Route comparison operators through the runtime adapter methods.
    pub binary_adapters: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self { char_comparison: true, binary_adapters: true }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NamingOptions {
    pub temp_prefix: String,
    pub ctor_ref_prefix: String,
    pub extension_bridge_prefix: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            temp_prefix: "$tmpVar$".to_string(),
            ctor_ref_prefix: "ctorRef$".to_string(),
            extension_bridge_prefix: "dgsm$$".to_string(),
        }
    }
}

impl LowerConfig {
    /// Parse a config from TOML text. `origin` is only used in error reports.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, LowerError> {
        let config: LowerConfig = toml::from_str(content)
            .map_err(|e| LowerError::config(format!("invalid lowering config: {e}"), origin.to_path_buf()))?;
        config.validate(origin)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LowerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LowerError::config(format!("cannot read config: {e}"), path.to_path_buf()))?;
        Self::from_toml_str(&content, path)
    }

    /// Look for `lower.toml` in `dir`; defaults when absent.
    pub fn discover(dir: &Path) -> Result<Self, LowerError> {
        let path: PathBuf = dir.join("lower.toml");
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self, origin: &Path) -> Result<(), LowerError> {
        let naming = &self.naming;
        for (key, value) in [
            ("temp_prefix", &naming.temp_prefix),
            ("ctor_ref_prefix", &naming.ctor_ref_prefix),
            ("extension_bridge_prefix", &naming.extension_bridge_prefix),
        ] {
            if value.is_empty() {
                return Err(LowerError::config(
                    format!("naming.{key} must not be empty"),
                    origin.to_path_buf(),
                ));
            }
            if value.contains(['.', ';', '[', '/', '<', '>']) {
                return Err(LowerError::config(
                    format!("naming.{key} '{value}' is not a valid member name prefix"),
                    origin.to_path_buf(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<LowerConfig, LowerError> {
        LowerConfig::from_toml_str(src, Path::new("lower.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, LowerConfig::default());
        assert!(config.lowering.char_comparison);
        assert_eq!(config.naming.temp_prefix, "$tmpVar$");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = parse("[lowering]\nchar_comparison = false\n").unwrap();
        assert!(!config.lowering.char_comparison);
        assert!(config.lowering.binary_adapters);
        assert_eq!(config.naming.ctor_ref_prefix, "ctorRef$");
    }

    #[test]
    fn unknown_key_rejected() {
        let err = parse("[lowering]\nfast_math = true\n").unwrap_err();
        assert!(matches!(err, LowerError::Config { .. }));
        assert!(err.to_string().contains("fast_math"));
    }

    #[test]
    fn invalid_prefix_rejected() {
        let err = parse("[naming]\ntemp_prefix = \"a.b\"\n").unwrap_err();
        assert!(err.to_string().contains("temp_prefix"));
        let err = parse("[naming]\nctor_ref_prefix = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
