//! library.rs — Bibliothèque de primitives émise dans chaque classe.
//!
//! Chaque primitive est `private static void name(java.util.Deque)` ; la pile
//! Kemuri est le seul argument (slot 0). Une cellule est un
//! `java.lang.Character`, le sommet est la tête de la `Deque`.
//!
//! Les bornes `max_stack`/`max_locals` ne sont pas écrites à la main : le
//! `CodeBuilder` les calcule à partir des instructions.

use kemuri_core::classfile::access;
use kemuri_core::{ClassBuilder, CodeBuilder, Opcode, Result};

use crate::primitive::{Primitive, DESCRIPTOR};

const DEQUE: &str = "java/util/Deque";
const CHARACTER: &str = "java/lang/Character";
const OBJECT: &str = "java/lang/Object";

const POP: &str = "()Ljava/lang/Object;";
const PUSH: &str = "(Ljava/lang/Object;)V";
const IS_EMPTY: &str = "()Z";
const VALUE_OF: &str = "(C)Ljava/lang/Character;";
const CHAR_VALUE: &str = "()C";

/// Texte empilé par `hello`.
pub const HELLO_WORLD: &str = "Hello, world!";

/// Locals de `rot` : 1 = sommet, 2 = second, 3 = troisième.
/// Ordre de ré-empilement ; le dernier poussé devient le sommet.
const ROT_PUSH_ORDER: [u8; 3] = [1, 3, 2];

/// Émet le constructeur puis les six primitives.
pub fn emit_library(cb: &mut ClassBuilder) -> Result<()> {
    emit_constructor(cb)?;
    for p in Primitive::ALL {
        cb.method(access::PRIVATE | access::STATIC, p.name(), DESCRIPTOR, |code| match p {
            Primitive::Dup => dup(code),
            Primitive::Hello => hello(code),
            Primitive::Not => not(code),
            Primitive::Rot => rot(code),
            Primitive::Xor => xor(code),
            Primitive::Print => print(code),
        })?;
    }
    Ok(())
}

/// `public <init>()V` : appelle `Object.<init>`.
fn emit_constructor(cb: &mut ClassBuilder) -> Result<()> {
    cb.method(access::PUBLIC, "<init>", "()V", |code| {
        code.load_ref(0)?;
        code.invoke_special(OBJECT, "<init>", "()V")?;
        code.insn(Opcode::Return)
    })
}

/// Dépile la cellule du sommet et la convertit en `char` (int JVM).
fn pop_char(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.invoke_interface(DEQUE, "pop", POP)?;
    code.type_insn(Opcode::Checkcast, CHARACTER)?;
    code.invoke_virtual(CHARACTER, "charValue", CHAR_VALUE)
}

/// `char` (int JVM) → `Character` empilé ; la `Deque` doit être dessous.
fn push_char(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.invoke_static(CHARACTER, "valueOf", VALUE_OF)?;
    code.invoke_interface(DEQUE, "push", PUSH)
}

fn dup(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.load_ref(0)?;
    code.insn(Opcode::Dup)?;
    code.invoke_interface(DEQUE, "pop", POP)?;
    // [deque, cell] → [deque, cell, deque, cell]
    code.insn(Opcode::Dup2)?;
    code.invoke_interface(DEQUE, "push", PUSH)?;
    code.invoke_interface(DEQUE, "push", PUSH)?;
    code.insn(Opcode::Return)
}

fn hello(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.load_ref(0)?;
    let units: Vec<u16> = HELLO_WORLD.encode_utf16().collect();
    for &unit in units.iter().rev() {
        code.insn(Opcode::Dup)?;
        code.push_int(i32::from(unit))?;
        push_char(code)?;
    }
    code.insn(Opcode::Pop)?;
    code.insn(Opcode::Return)
}

fn not(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.load_ref(0)?;
    code.insn(Opcode::Dup)?;
    pop_char(code)?;
    // (255 - c) mod 65536
    code.insn(Opcode::Ineg)?;
    code.push_int(255)?;
    code.insn(Opcode::Iadd)?;
    code.insn(Opcode::I2c)?;
    push_char(code)?;
    code.insn(Opcode::Return)
}

fn rot(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.load_ref(0)?;
    for slot in 1..=3 {
        code.insn(Opcode::Dup)?;
        code.invoke_interface(DEQUE, "pop", POP)?;
        code.store_ref(slot)?;
    }
    for slot in ROT_PUSH_ORDER {
        code.insn(Opcode::Dup)?;
        code.load_ref(slot)?;
        code.invoke_interface(DEQUE, "push", PUSH)?;
    }
    code.insn(Opcode::Pop)?;
    code.insn(Opcode::Return)
}

fn xor(code: &mut CodeBuilder<'_>) -> Result<()> {
    code.load_ref(0)?;
    code.insn(Opcode::Dup)?;
    code.insn(Opcode::Dup)?;
    pop_char(code)?;
    // [deque, deque, a] → [deque, a, deque]
    code.insn(Opcode::Swap)?;
    pop_char(code)?;
    code.insn(Opcode::Ixor)?;
    push_char(code)?;
    code.insn(Opcode::Return)
}

fn print(code: &mut CodeBuilder<'_>) -> Result<()> {
    let top = code.new_label();
    let done = code.new_label();

    code.bind(top)?;
    code.load_ref(0)?;
    code.invoke_interface(DEQUE, "isEmpty", IS_EMPTY)?;
    code.jump(Opcode::Ifne, done)?;
    code.get_static("java/lang/System", "out", "Ljava/io/PrintStream;")?;
    code.load_ref(0)?;
    pop_char(code)?;
    code.invoke_virtual("java/io/PrintStream", "print", "(C)V")?;
    code.jump(Opcode::Goto, top)?;

    code.bind(done)?;
    code.insn(Opcode::Return)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kemuri_core::ClassFile;
    use pretty_assertions::assert_eq;

    fn library() -> ClassFile {
        let mut cb = ClassBuilder::new("t/Lib", OBJECT, access::PUBLIC | access::SUPER).unwrap();
        emit_library(&mut cb).unwrap();
        ClassFile::parse(&cb.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn declared_bounds() {
        let cf = library();
        let bounds = |name: &str, desc: &str| {
            let code = cf.method(name, desc).and_then(|m| m.code.as_ref()).unwrap();
            (code.max_stack, code.max_locals)
        };
        assert_eq!(bounds("<init>", "()V"), (1, 1));
        assert_eq!(bounds("dup", DESCRIPTOR), (4, 1));
        assert_eq!(bounds("hello", DESCRIPTOR), (3, 1));
        assert_eq!(bounds("not", DESCRIPTOR), (3, 1));
        assert_eq!(bounds("rot", DESCRIPTOR), (3, 4));
        assert_eq!(bounds("xor", DESCRIPTOR), (3, 1));
        assert_eq!(bounds("print", DESCRIPTOR), (2, 1));
    }

    #[test]
    fn not_narrows_to_char_before_boxing() {
        use kemuri_core::classfile::opcode::decode;
        use Opcode::*;
        let cf = library();
        let code = cf.method("not", DESCRIPTOR).and_then(|m| m.code.as_ref()).unwrap();
        let ops: Vec<Opcode> = decode(&code.bytes).unwrap().into_iter().map(|i| i.op).collect();
        assert!(ops.windows(4).any(|w| w == [Ineg, Sipush, Iadd, I2c]), "{ops:?}");
        let boxed = ops.iter().position(|op| *op == Invokestatic).unwrap();
        assert_eq!(ops[boxed - 1], I2c);
    }

    #[test]
    fn primitives_are_private_static() {
        let cf = library();
        for p in Primitive::ALL {
            let m = cf.method(p.name(), DESCRIPTOR).unwrap();
            assert_eq!(m.access, access::PRIVATE | access::STATIC, "{p}");
        }
        assert_eq!(cf.method("<init>", "()V").unwrap().access, access::PUBLIC);
    }
}
