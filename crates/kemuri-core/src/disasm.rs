//! disasm.rs — Désassembleur “lisible humain” façon `javap -c`.
//!
//! - En-tête : nom, super, version, taille du pool, SourceFile
//! - Par méthode : drapeaux, nom+descripteur, `stack=/locals=`
//! - Une ligne par instruction, références du pool résolues en commentaire
//!   et cibles de saut en absolu

use std::fmt::Write as _;

use crate::classfile::access;
use crate::classfile::constant_pool::Constant;
use crate::classfile::opcode::{decode, Instruction, Operand};
use crate::{ClassFile, Result};

/// Listing complet d’une classe.
pub fn disassemble(class: &ClassFile) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "class {} extends {}", class.name()?, class.super_name()?);
    let _ = writeln!(
        out,
        "  version: {}.{}   constants: {}   methods: {}",
        class.major_version,
        class.minor_version,
        class.pool.len(),
        class.methods.len()
    );
    if let Some(src) = &class.source_file {
        let _ = writeln!(out, "  source: {src}");
    }

    for m in &class.methods {
        let flags = access::method_flags_to_string(m.access);
        let _ = writeln!(out);
        if flags.is_empty() {
            let _ = writeln!(out, "{}{}", m.name, m.descriptor);
        } else {
            let _ = writeln!(out, "{flags} {}{}", m.name, m.descriptor);
        }
        let Some(code) = &m.code else {
            continue;
        };
        let _ = writeln!(out, "  Code: stack={}, locals={}", code.max_stack, code.max_locals);
        for insn in decode(&code.bytes)? {
            let _ = writeln!(out, "    {}", render(class, &insn));
        }
    }
    Ok(out)
}

/// Une instruction : `offset: mnemonic operandes // commentaire`.
fn render(class: &ClassFile, insn: &Instruction) -> String {
    let head = format!("{:>4}: {}", insn.offset, insn.op.mnemonic());
    match insn.operand {
        Operand::None => head,
        Operand::Int(v) => format!("{head} {v}"),
        Operand::Local(slot) => format!("{head} {slot}"),
        Operand::Branch(target) => format!("{head} {target}"),
        Operand::Const(idx) => format!("{:<28} // {}", format!("{head} #{idx}"), describe(class, idx)),
        Operand::Interface { index, count } => {
            format!("{:<28} // {}", format!("{head} #{index}, {count}"), describe(class, index))
        }
    }
}

fn describe(class: &ClassFile, idx: u16) -> String {
    let pool = &class.pool;
    match pool.get(idx) {
        Some(Constant::Integer(v)) => format!("int {v}"),
        Some(Constant::String { value }) => match pool.utf8_at(*value) {
            Ok(s) => format!("String {s:?}"),
            Err(_) => "<invalid>".into(),
        },
        Some(Constant::Class { .. }) => match pool.class_name_at(idx) {
            Ok(name) => format!("class {name}"),
            Err(_) => "<invalid>".into(),
        },
        Some(c @ (Constant::Fieldref { .. } | Constant::Methodref { .. } | Constant::InterfaceMethodref { .. })) => {
            let kind = match c {
                Constant::Fieldref { .. } => "Field",
                Constant::Methodref { .. } => "Method",
                _ => "InterfaceMethod",
            };
            match pool.member_ref_at(idx) {
                Ok(m) => format!("{kind} {}.{}:{}", m.owner, m.name, m.descriptor),
                Err(_) => "<invalid>".into(),
            }
        }
        Some(other) => format!("{other:?}"),
        None => "<invalid>".into(),
    }
}
