//! class_name.rs — Nom de la classe produite.
//!
//! L’appelant donne un nom pointé (`jp.example.Hello`) ; la classe porte le
//! nom interne (`jp/example/Hello`). Validé avant toute émission.

use std::fmt;

use crate::{CompileError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassName {
    dotted: String,
    internal: String,
}

impl ClassName {
    /// Refuse : nom vide, segment vide (`a..b`, `.A`, `A.`), `/ ; [`.
    pub fn parse(name: &str) -> Result<Self> {
        let reject = |why: &'static str| CompileError::InvalidClassName { name: name.to_owned(), reason: why };

        if name.is_empty() {
            return Err(reject("nom vide"));
        }
        if name.split('.').any(str::is_empty) {
            return Err(reject("segment vide"));
        }
        if name.contains(['/', ';', '[']) {
            return Err(reject("caractère interdit (/ ; [)"));
        }
        Ok(Self { dotted: name.to_owned(), internal: name.replace('.', "/") })
    }

    /// Nom complet tel que donné (`jp.example.Hello`).
    pub fn dotted(&self) -> &str {
        &self.dotted
    }

    /// Nom interne JVM (`jp/example/Hello`).
    pub fn internal(&self) -> &str {
        &self.internal
    }

    /// Nom de fichier produit par `compile_to` : le nom complet + `.class`.
    pub fn file_name(&self) -> String {
        format!("{}.class", self.dotted)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dotted_to_internal() {
        let n = ClassName::parse("jp.example.Hello").unwrap();
        assert_eq!(n.internal(), "jp/example/Hello");
        assert_eq!(n.file_name(), "jp.example.Hello.class");

        let bare = ClassName::parse("Main").unwrap();
        assert_eq!((bare.internal(), bare.file_name().as_str()), ("Main", "Main.class"));
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["", ".", "a..b", ".A", "A.", "a/b", "A;", "[A"] {
            assert!(
                matches!(ClassName::parse(bad), Err(CompileError::InvalidClassName { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn non_ascii_is_fine() {
        assert_eq!(ClassName::parse("démo.Épreuve").unwrap().internal(), "démo/Épreuve");
    }
}
