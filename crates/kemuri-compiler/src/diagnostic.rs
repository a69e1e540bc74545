//! diagnostic.rs — Diagnostics de compilation.
//!
//! Kemuri n’a qu’un seul cas : un caractère qui n’est pas une commande.
//! Il est ignoré (aucune instruction émise) et signalé ici.

use std::fmt;

/// Gravité des diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
}

/// Diagnostic minimaliste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Caractère fautif.
    pub glyph: char,
    /// Position (0-based, en code points) dans la source.
    pub position: usize,
}

impl Diagnostic {
    pub fn unknown_command(glyph: char, position: usize) -> Self {
        Self { severity: Severity::Warning, glyph, position }
    }

    pub fn message(&self) -> String {
        format!("commande inconnue: {:?}", self.glyph)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {} (position {})", self.message(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_glyph_and_position() {
        let d = Diagnostic::unknown_command('A', 3);
        assert_eq!(d.to_string(), "warning: commande inconnue: 'A' (position 3)");
    }
}
