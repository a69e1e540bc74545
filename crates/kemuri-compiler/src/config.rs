//! config.rs — Configuration du compilateur Kemuri.
//!
//! Couches (la dernière gagne) :
//! - Defaults sûrs (`Config::default()`)
//! - Lecture **ENV** (préfixe `KEMURI_...`) via `Config::from_env()`
//! - Fichier TOML (`Config::from_toml_str` / `from_toml_file`)
//! - **Overrides CLI** via `CliOverrides` (appliqués avec `apply_cli_overrides`)
//!
//! ENV supportés (tous facultatifs) :
//!   KEMURI_WARN=allow|warn
//!   KEMURI_SOURCE_FILE=<nom>
//!   KEMURI_MAX_COMMANDS=<usize>
//!
//! Exemple de `kemuri.toml` :
//! ```toml
//! warnings = "allow"
//! source_file = "hello.kmr"
//!
//! [limits]
//! max_commands = 10000
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CompileError, Result};

/* ─────────────────────────── Types publics ─────────────────────────── */

/// Politique d’avertissements pour les commandes inconnues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningsAs {
    /// Diagnostic journalisé en `debug`.
    Allow,
    /// Diagnostic journalisé en `warn`.
    #[default]
    Warn,
}

/// Limites de sûreté.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Nombre maximal de commandes reconnues par programme (aucun par défaut).
    pub max_commands: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub warnings: WarningsAs,
    /// Écrit comme attribut `SourceFile` de la classe.
    pub source_file: Option<String>,
    pub limits: Limits,
}

/// Couche TOML : seules les clés écrites dans le fichier sont `Some`.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TomlLayer {
    warnings: Option<WarningsAs>,
    source_file: Option<String>,
    limits: Limits,
}

/* ─────────────────────── Overrides (CLI / couches) ─────────────────────── */

/// Overrides typiques fournis par une CLI en amont.
#[derive(Default, Clone, Debug)]
pub struct CliOverrides {
    pub warnings: Option<WarningsAs>,
    pub source_file: Option<String>,
    pub max_commands: Option<usize>,
}

impl Config {
    /// Construit depuis les valeurs par défaut + ENV.
    pub fn from_env() -> Self {
        let mut c = Self::default();
        c.apply_env();
        c
    }

    /// Applique les variables d’environnement `KEMURI_*`.
    ///
    /// Les valeurs illisibles sont ignorées.
    pub fn apply_env(&mut self) {
        self.apply_env_with(read_env);
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(w) = lookup("KEMURI_WARN").as_deref().and_then(parse_warn) {
            self.warnings = w;
        }
        if let Some(v) = lookup("KEMURI_SOURCE_FILE") {
            let v = v.trim();
            if !v.is_empty() {
                self.source_file = Some(v.to_owned());
            }
        }
        if let Some(n) = lookup("KEMURI_MAX_COMMANDS").and_then(|v| v.trim().parse().ok()) {
            self.limits.max_commands = Some(n);
        }
    }

    /// Config complète depuis un TOML seul (clés absentes → defaults).
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut c = Self::default();
        c.apply_toml_str(s)?;
        Ok(c)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut c = Self::default();
        c.apply_toml_file(path)?;
        Ok(c)
    }

    /// Pose les clés présentes dans le TOML par-dessus la config courante.
    /// Une clé absente garde sa valeur (ENV ou default).
    pub fn apply_toml_str(&mut self, s: &str) -> Result<()> {
        let layer: TomlLayer = toml::from_str(s).map_err(|e| CompileError::Config(e.to_string()))?;
        if let Some(w) = layer.warnings { self.warnings = w; }
        if let Some(f) = layer.source_file { self.source_file = Some(f); }
        if let Some(n) = layer.limits.max_commands { self.limits.max_commands = Some(n); }
        Ok(())
    }

    pub fn apply_toml_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)?;
        self.apply_toml_str(&s).map_err(|e| match e {
            CompileError::Config(msg) => CompileError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Applique des overrides “dernier mot” typiquement issus d’une CLI.
    pub fn apply_cli_overrides(&mut self, o: &CliOverrides) {
        if let Some(x) = o.warnings { self.warnings = x; }
        if let Some(x) = &o.source_file { self.source_file = Some(x.clone()); }
        if let Some(x) = o.max_commands { self.limits.max_commands = Some(x); }
    }
}

/* ────────────────────────── Parsing d’ENV ────────────────────────── */

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_warn(s: &str) -> Option<WarningsAs> {
    match s.trim().to_ascii_lowercase().as_str() {
        "allow" => Some(WarningsAs::Allow),
        "warn" => Some(WarningsAs::Warn),
        _ => None,
    }
}

/* ───────────────────────────── Tests ───────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.warnings, WarningsAs::Warn);
        assert_eq!(c.source_file, None);
        assert_eq!(c.limits.max_commands, None);
    }

    #[test]
    fn toml_layer() {
        let c = Config::from_toml_str(
            r#"
            warnings = "allow"
            source_file = "hello.kmr"

            [limits]
            max_commands = 12
            "#,
        )
        .unwrap();
        assert_eq!(c.warnings, WarningsAs::Allow);
        assert_eq!(c.source_file.as_deref(), Some("hello.kmr"));
        assert_eq!(c.limits.max_commands, Some(12));

        // champs absents → defaults
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = Config::from_toml_str("optimize = true").unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn toml_file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kemuri.toml");
        fs::write(&path, "warnings = \"loud\"").unwrap();
        let err = Config::from_toml_file(&path).unwrap_err();
        assert!(err.to_string().contains("kemuri.toml"), "{err}");
        assert!(matches!(Config::from_toml_file(dir.path().join("absent.toml")), Err(CompileError::Io(_))));
    }

    #[test]
    fn toml_beats_env_but_keeps_unset_keys() {
        let env = |k: &str| match k {
            "KEMURI_WARN" => Some("warn".to_owned()),
            "KEMURI_SOURCE_FILE" => Some("env.kmr".to_owned()),
            "KEMURI_MAX_COMMANDS" => Some("7".to_owned()),
            _ => None,
        };
        let mut c = Config::default();
        c.apply_env_with(env);
        c.apply_toml_str("warnings = \"allow\"").unwrap();

        assert_eq!(c.warnings, WarningsAs::Allow);
        assert_eq!(c.source_file.as_deref(), Some("env.kmr"));
        assert_eq!(c.limits.max_commands, Some(7));
    }

    #[test]
    fn toml_file_layers_over_current_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kemuri.toml");
        fs::write(&path, "[limits]\nmax_commands = 2\n").unwrap();

        let mut c = Config { warnings: WarningsAs::Allow, ..Config::default() };
        c.apply_toml_file(&path).unwrap();
        assert_eq!(c.warnings, WarningsAs::Allow);
        assert_eq!(c.limits.max_commands, Some(2));
    }

    #[test]
    fn cli_overrides_last_word() {
        let mut c = Config::from_toml_str("warnings = \"allow\"").unwrap();
        let o = CliOverrides {
            warnings: Some(WarningsAs::Warn),
            source_file: Some("x.kmr".into()),
            max_commands: Some(3),
        };
        c.apply_cli_overrides(&o);
        assert_eq!(c.warnings, WarningsAs::Warn);
        assert_eq!(c.source_file.as_deref(), Some("x.kmr"));
        assert_eq!(c.limits.max_commands, Some(3));
    }

    #[test]
    fn warn_parse() {
        assert_eq!(parse_warn(" ALLOW "), Some(WarningsAs::Allow));
        assert_eq!(parse_warn("deny"), None);
    }
}
