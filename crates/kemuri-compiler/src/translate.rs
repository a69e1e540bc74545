//! translate.rs — Traduction du flot de commandes en corps de `main`.
//!
//! ```text
//! new ArrayDeque ; dup ; invokespecial <init>     // la pile Kemuri
//! (dup ; invokestatic <this>.<primitive>)*        // une paire par commande
//! pop ; return
//! ```
//!
//! Un caractère inconnu n’émet rien et produit un diagnostic.

use kemuri_core::{CodeBuilder, Opcode};
use log::{debug, trace, warn};

use crate::config::{Config, WarningsAs};
use crate::diagnostic::Diagnostic;
use crate::primitive::{Primitive, DESCRIPTOR};
use crate::{CompileError, Result};

pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// Ce que la traduction a observé.
#[derive(Debug, Default)]
pub struct Translation {
    /// Commandes reconnues (donc appels émis).
    pub commands: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Émet le corps de `main` pour `source`, appels dirigés vers `owner`.
pub fn translate<I>(code: &mut CodeBuilder<'_>, owner: &str, source: I, config: &Config) -> Result<Translation>
where
    I: IntoIterator<Item = char>,
{
    let mut out = Translation::default();

    code.type_insn(Opcode::New, "java/util/ArrayDeque")?;
    code.insn(Opcode::Dup)?;
    code.invoke_special("java/util/ArrayDeque", "<init>", "()V")?;

    for (position, glyph) in source.into_iter().enumerate() {
        let Some(p) = Primitive::from_glyph(glyph) else {
            out.diagnostics.push(unknown(glyph, position, config.warnings));
            continue;
        };
        out.commands += 1;
        if let Some(max) = config.limits.max_commands {
            if out.commands > max {
                return Err(CompileError::TooManyCommands { max });
            }
        }
        trace!(target: "kemuri", "{position}: {glyph} → {p}");
        code.insn(Opcode::Dup)?;
        code.invoke_static(owner, p.name(), DESCRIPTOR)?;
    }

    code.insn(Opcode::Pop)?;
    code.insn(Opcode::Return)?;
    Ok(out)
}

/// Le diagnostic reste un avertissement ; la politique ne choisit que le niveau de log.
fn unknown(glyph: char, position: usize, policy: WarningsAs) -> Diagnostic {
    let d = Diagnostic::unknown_command(glyph, position);
    match policy {
        WarningsAs::Warn => warn!(target: "kemuri", "{}", d),
        WarningsAs::Allow => debug!(target: "kemuri", "{}", d),
    }
    d
}
