//! primitive.rs — Les six commandes Kemuri et leur primitive JVM.
//!
//! Table fermée : un glyphe ↔ une méthode `static void name(Deque)` émise
//! dans chaque classe compilée.

use std::fmt;

/// Descripteur commun à toutes les primitives.
pub const DESCRIPTOR: &str = "(Ljava/util/Deque;)V";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `"` : duplique le sommet.
    Dup,
    /// `` ` `` : empile « Hello, world! » (lisible en dépilant).
    Hello,
    /// `~` : `255 - c` tronqué à 16 bits.
    Not,
    /// `'` : rotation des trois cellules du sommet.
    Rot,
    /// `^` : xor des deux cellules du sommet.
    Xor,
    /// `|` : vide la pile sur la sortie standard.
    Print,
}

impl Primitive {
    /// Ordre d’émission dans la classe.
    pub const ALL: [Primitive; 6] = [
        Primitive::Dup,
        Primitive::Print,
        Primitive::Hello,
        Primitive::Not,
        Primitive::Rot,
        Primitive::Xor,
    ];

    pub fn from_glyph(c: char) -> Option<Primitive> {
        match c {
            '"' => Some(Primitive::Dup),
            '`' => Some(Primitive::Hello),
            '~' => Some(Primitive::Not),
            '\'' => Some(Primitive::Rot),
            '^' => Some(Primitive::Xor),
            '|' => Some(Primitive::Print),
            _ => None,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Primitive::Dup => '"',
            Primitive::Hello => '`',
            Primitive::Not => '~',
            Primitive::Rot => '\'',
            Primitive::Xor => '^',
            Primitive::Print => '|',
        }
    }

    /// Nom de la méthode JVM.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Dup => "dup",
            Primitive::Hello => "hello",
            Primitive::Not => "not",
            Primitive::Rot => "rot",
            Primitive::Xor => "xor",
            Primitive::Print => "print",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn glyphs_roundtrip() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_glyph(p.glyph()), Some(p));
        }
    }

    #[test]
    fn everything_else_is_unknown() {
        // dont des sosies : accent aigu, tilde pleine chasse
        for c in ['a', ' ', '\n', '´', '\u{FF5E}', '\0'] {
            assert_eq!(Primitive::from_glyph(c), None, "{c:?}");
        }
    }

    #[test]
    fn names_are_distinct() {
        let mut names: Vec<_> = Primitive::ALL.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 6);
    }
}
