//! kemuri-compiler — Compilateur Kemuri → classe JVM
//!
//! Kemuri : six commandes d’un caractère sur une pile de cellules 16 bits.
//! Chaque programme devient une classe autonome : six primitives statiques
//! (la “bibliothèque”), un constructeur, et un `main` qui enchaîne un appel
//! par commande.
//!
//! | glyphe | primitive | effet |
//! |---|---|---|
//! | `"` | `dup`   | duplique le sommet |
//! | `` ` `` | `hello` | empile « Hello, world! » |
//! | `~` | `not`   | `255 - c` (16 bits) |
//! | `'` | `rot`   | X,Y,Z (sommet d’abord) → Y,Z,X |
//! | `^` | `xor`   | `a ^ b` |
//! | `\|` | `print` | vide la pile sur stdout |
//!
//! ## Modules
//! - `primitive`  : table glyphe ↔ primitive.
//! - `library`    : émission des primitives et du constructeur.
//! - `translate`  : corps de `main`.
//! - `driver`     : `Compiler`, `compile`, `compile_to`.
//! - `config`     : couches defaults → ENV → TOML → CLI.
//! - `class_name` / `diagnostic` : validation du nom, avertissements.
//!
//! ```no_run
//! let class = kemuri_compiler::compile("`|".chars(), "jp.example.Hello")?;
//! std::fs::write("jp.example.Hello.class", &class.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use std::path::PathBuf;

use thiserror::Error;

pub mod class_name;
pub mod config;
pub mod diagnostic;
pub mod driver;
pub mod library;
pub mod primitive;
pub mod translate;

pub use class_name::ClassName;
pub use config::{CliOverrides, Config, Limits, WarningsAs};
pub use diagnostic::{Diagnostic, Severity};
pub use driver::{compile, compile_to, CompiledClass, Compiler};
pub use primitive::Primitive;

pub use kemuri_core::ClassFileError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("nom de classe invalide {name:?}: {reason}")]
    InvalidClassName { name: String, reason: &'static str },

    #[error("pas un répertoire: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("plus de {max} commandes")]
    TooManyCommands { max: usize },

    #[error("configuration invalide: {0}")]
    Config(String),

    #[error(transparent)]
    ClassFile(#[from] ClassFileError),

    #[error("E/S: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CompileError> = core::result::Result<T, E>;

pub mod prelude {
    pub use crate::{compile, compile_to, CompileError, CompiledClass, Compiler, Config, Primitive, Result};
}
