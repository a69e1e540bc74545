//! kemuri-core — Boîte à outils class-file pour Kemuri
//!
//! Tout ce qu’il faut pour fabriquer, relire et exécuter (en MVP) une classe
//! JVM, sans dépendre du compilateur.
//!
//! ## Modules
//! - `classfile` : pool de constantes, opcodes, descripteurs, `CodeBuilder`
//!   (comptabilité de pile d’opérandes), writer et reader.
//! - `disasm`    : désassembleur lisible façon `javap -c`.
//! - `runtime::eval` (feature `eval`) : évaluateur léger du sous-ensemble de
//!   bytecode émis par le compilateur (tests, `kemuri run`).
//!
//! ## Features
//! - **eval** *(par défaut)* : inclut `runtime::eval`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use thiserror::Error;

// ---------- Modules publics ----------
pub mod classfile;
pub mod disasm;

#[cfg(feature = "eval")]
pub mod runtime {
    /// Évaluateur léger de bytecode (idéal pour tests/outils).
    pub mod eval;
}

// ---------- Reexports de confort ----------
pub use classfile::{
    code::{Code, CodeBuilder, Label},
    constant_pool::{Constant, ConstantPool},
    descriptor::{FieldType, MethodDescriptor},
    opcode::{Instruction, Opcode, Operand},
    reader::{ClassFile, Method},
    writer::ClassBuilder,
};

// ---------- Version ----------
/// Version du crate (lisible, via Cargo).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Renvoie une jolie bannière de version (utile pour logs/outils).
pub fn version() -> String {
    format!("kemuri-core {VERSION}")
}

// ---------- Erreurs & Résultat ----------
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Le pool est plafonné à 65 534 entrées utiles.
    #[error("pool de constantes plein ({0} entrées)")]
    ConstantPoolOverflow(usize),

    #[error("chaîne trop longue pour CONSTANT_Utf8 ({0} octets encodés)")]
    Utf8TooLong(usize),

    #[error("utf8 modifié invalide: {0}")]
    BadUtf8(String),

    #[error("descripteur invalide: {0:?}")]
    BadDescriptor(String),

    #[error("pile d’opérandes négative à l’offset {offset}")]
    StackUnderflow { offset: usize },

    #[error("pile d’opérandes trop profonde à l’offset {offset}")]
    StackOverflow { offset: usize },

    #[error("profondeur incohérente au label L{label}: attendu {expected}, trouvé {found}")]
    LabelDepthMismatch { label: u32, expected: u16, found: u16 },

    #[error("label L{0} jamais lié")]
    UnboundLabel(u32),

    #[error("label L{0} lié deux fois")]
    LabelAlreadyBound(u32),

    #[error("saut hors de portée ({0} octets)")]
    BranchOutOfRange(i64),

    #[error("code de méthode trop long: {0} octets (max 65535)")]
    CodeTooLarge(usize),

    #[error("trop de méthodes ({0})")]
    TooManyMethods(usize),

    #[error("instruction `{0}` mal utilisée: {1}")]
    BadInstruction(&'static str, &'static str),

    #[error("classe tronquée à l’offset {0}")]
    Truncated(usize),

    #[error("mauvais magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("tag de constante non supporté: {tag} (index #{index})")]
    UnsupportedConstant { tag: u8, index: u16 },

    #[error("référence de constante invalide: #{0}")]
    BadConstantRef(u16),

    #[error("opcode inconnu 0x{byte:02x} à l’offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },
}

pub type Result<T, E = ClassFileError> = core::result::Result<T, E>;

// ---------- Prelude ----------
pub mod prelude {
    pub use crate::classfile::access;
    pub use crate::{
        ClassBuilder, ClassFile, ClassFileError, Code, CodeBuilder, ConstantPool, Label,
        MethodDescriptor, Opcode, Result,
    };
}

// ---------- Tests ----------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_banner() {
        assert!(version().starts_with("kemuri-core "));
    }

    #[test]
    fn errors_render() {
        let e = ClassFileError::LabelDepthMismatch { label: 2, expected: 1, found: 0 };
        assert!(e.to_string().contains("L2"));
        let e = ClassFileError::BadMagic(0xdead_beef);
        assert!(e.to_string().contains("0xdeadbeef"));
    }
}
