//! driver.rs — Assemblage d’une classe Kemuri complète.
//!
//! Une compilation = une classe neuve :
//!   constructeur + six primitives + `main` traduit depuis la source.
//! Tout est construit en mémoire ; `compile_to` n’écrit qu’une fois les
//! octets prêts.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use kemuri_core::classfile::access;
use kemuri_core::ClassBuilder;
use log::{debug, info};

use crate::class_name::ClassName;
use crate::config::Config;
use crate::diagnostic::Diagnostic;
use crate::library::emit_library;
use crate::translate::{translate, Translation, MAIN_DESCRIPTOR};
use crate::{CompileError, Result};

/// Résultat d’une compilation, immuable une fois rendu.
#[derive(Debug, Clone)]
pub struct CompiledClass {
    pub class_name: ClassName,
    /// Fichier `.class` complet.
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledClass {
    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: Config,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile `source` en une classe nommée `class_name` (nom pointé).
    pub fn compile<I>(&self, source: I, class_name: &str) -> Result<CompiledClass>
    where
        I: IntoIterator<Item = char>,
    {
        let name = ClassName::parse(class_name)?;
        let mut cb = ClassBuilder::new(name.internal(), "java/lang/Object", access::PUBLIC | access::SUPER)?;
        emit_library(&mut cb)?;

        // erreurs de classfile : propagées par `method` ; les autres sont gardées ici
        let mut outcome = Ok(Translation::default());
        let owner = name.internal().to_owned();
        cb.method(access::PUBLIC | access::STATIC, "main", MAIN_DESCRIPTOR, |code| {
            match translate(code, &owner, source, &self.config) {
                Err(CompileError::ClassFile(e)) => Err(e),
                other => {
                    outcome = other;
                    Ok(())
                }
            }
        })?;
        let translation = outcome?;

        if let Some(src) = &self.config.source_file {
            cb.set_source_file(src)?;
        }
        let bytes = cb.to_bytes()?;

        info!(
            target: "kemuri",
            "{name}: {} commandes, {} diagnostics, {} octets",
            translation.commands,
            translation.diagnostics.len(),
            bytes.len()
        );
        Ok(CompiledClass { class_name: name, bytes, diagnostics: translation.diagnostics })
    }

    pub fn compile_str(&self, source: &str, class_name: &str) -> Result<CompiledClass> {
        self.compile(source.chars(), class_name)
    }

    /// Lit toute la source (UTF-8) puis compile.
    pub fn compile_reader<R: Read>(&self, mut reader: R, class_name: &str) -> Result<CompiledClass> {
        // nom validé avant de consommer le lecteur
        ClassName::parse(class_name)?;
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        self.compile_str(&source, class_name)
    }

    /// Compile puis écrit `<dir>/<class_name>.class` ; `dir` doit exister.
    pub fn compile_to<I>(&self, source: I, class_name: &str, dir: impl AsRef<Path>) -> Result<(PathBuf, CompiledClass)>
    where
        I: IntoIterator<Item = char>,
    {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CompileError::NotADirectory(dir.to_path_buf()));
        }
        let compiled = self.compile(source, class_name)?;
        let path = dir.join(compiled.class_name.file_name());
        fs::write(&path, &compiled.bytes)?;
        debug!(target: "kemuri", "écrit {}", path.display());
        Ok((path, compiled))
    }
}

/// `Compiler::default().compile(...)`.
pub fn compile<I>(source: I, class_name: &str) -> Result<CompiledClass>
where
    I: IntoIterator<Item = char>,
{
    Compiler::default().compile(source, class_name)
}

/// `Compiler::default().compile_to(...)`, chemin écrit seulement.
pub fn compile_to<I>(source: I, class_name: &str, dir: impl AsRef<Path>) -> Result<PathBuf>
where
    I: IntoIterator<Item = char>,
{
    Compiler::default().compile_to(source, class_name, dir).map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn each_call_starts_fresh() {
        let c = Compiler::default();
        let a = c.compile_str("`|", "A").unwrap();
        let b = c.compile_str("`|", "A").unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert!(!a.has_diagnostics());
    }

    #[test]
    fn bad_name_before_any_work() {
        let err = Compiler::default().compile_str("`|", "a..b").unwrap_err();
        assert!(matches!(err, CompileError::InvalidClassName { .. }));
    }

    #[test]
    fn reader_errors_are_io() {
        let bytes: &[u8] = &[b'|', 0xff, 0xfe];
        let err = Compiler::default().compile_reader(bytes, "A").unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }
}
