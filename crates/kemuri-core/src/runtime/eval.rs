//! kemuri-core/src/runtime/eval.rs
//!
//! Évaluateur “léger” du bytecode émis pour Kemuri, pour tests et outils.
//! Objectif : exécuter une classe compilée sans JVM.
//!
//! Gère (MVP) :
//!   - Constantes : iconst/bipush/sipush/ldc (Integer)
//!   - Pile : pop, dup, dup2, swap ; locals : aload/astore
//!   - Arith : iadd, ineg, ixor
//!   - Contrôle : ifeq, ifne, goto, return
//!   - Objets : new, checkcast, getstatic `System.out`
//!   - Appels : méthodes statiques de la classe chargée + stubs de
//!     `ArrayDeque`/`Deque`, `Character`, `PrintStream.print(C)`, `Object.<init>`
//!
//! Les exceptions Java (pile vide, cast raté, null) remontent en
//! `EvalError::Exception` : c’est ainsi que se manifeste un programme Kemuri
//! qui dépile une pile vide.
//!
//! API:
//!   - `run_main(&ClassFile, EvalOptions) -> Result<EvalOutput, EvalError>`
//!   - `Machine::call_primitive(name, &mut Vec<u16>)` pour tester une primitive seule

use std::collections::VecDeque;

use thiserror::Error;

use crate::classfile::opcode::{decode, Instruction, Opcode, Operand};
use crate::classfile::constant_pool::Constant;
use crate::classfile::descriptor::MethodDescriptor;
use crate::{ClassFile, ClassFileError};

const DEQUE_DESC: &str = "(Ljava/util/Deque;)V";
const MAIN_DESC: &str = "([Ljava/lang/String;)V";

#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Garde-fou : limite d’instructions pour éviter les boucles infinies.
    pub max_steps: Option<usize>,
    /// Profondeur d’appels statiques imbriqués.
    pub max_call_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { max_steps: Some(10_000_000), max_call_depth: 256 }
    }
}

#[derive(Debug, Default)]
pub struct EvalOutput {
    /// Unités UTF-16 écrites par `PrintStream.print(char)`, dans l’ordre.
    pub stdout_units: Vec<u16>,
    pub steps: usize,
}

impl EvalOutput {
    /// Sortie décodée (surrogates orphelins remplacés par U+FFFD).
    pub fn stdout_string(&self) -> String {
        String::from_utf16_lossy(&self.stdout_units)
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    ClassFile(#[from] ClassFileError),

    #[error("méthode introuvable: {0}")]
    NoSuchMethod(String),

    #[error("non supporté: {0}")]
    Unsupported(String),

    #[error("{class} levée dans {method} à l’offset {offset}")]
    Exception { class: &'static str, method: String, offset: usize },

    #[error("pile d’opérandes vide dans {method} à l’offset {offset}")]
    OperandUnderflow { method: String, offset: usize },

    #[error("type inattendu dans {method} à l’offset {offset}: {detail}")]
    TypeMismatch { method: String, offset: usize, detail: String },

    #[error("limite d’instructions atteinte ({0})")]
    StepLimit(usize),

    #[error("profondeur d’appel maximale atteinte ({0})")]
    CallDepth(usize),
}

pub type Result<T, E = EvalError> = core::result::Result<T, E>;

/// Exécute `main(String[])` et renvoie la sortie capturée.
pub fn run_main(class: &ClassFile, opts: EvalOptions) -> Result<EvalOutput> {
    let mut m = Machine::new(class, opts);
    m.run_main()?;
    Ok(m.into_output())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Null,
    Int(i32),
    Ref(usize),
}

#[derive(Debug)]
enum Object {
    /// `ArrayDeque` : front = sommet de pile.
    Deque(VecDeque<Value>),
    Char(u16),
    PrintStream,
    /// `String[]` de `main` (jamais lu).
    Args,
    Plain,
}

pub struct Machine<'c> {
    class: &'c ClassFile,
    opts: EvalOptions,
    heap: Vec<Object>,
    system_out: Option<usize>,
    out: Vec<u16>,
    steps: usize,
}

/// Contexte d’erreur : méthode + offset courants.
struct Here<'a> {
    method: &'a str,
    offset: usize,
}

impl Here<'_> {
    fn exception(&self, class: &'static str) -> EvalError {
        EvalError::Exception { class, method: self.method.to_owned(), offset: self.offset }
    }

    fn underflow(&self) -> EvalError {
        EvalError::OperandUnderflow { method: self.method.to_owned(), offset: self.offset }
    }

    fn mismatch(&self, detail: impl Into<String>) -> EvalError {
        EvalError::TypeMismatch { method: self.method.to_owned(), offset: self.offset, detail: detail.into() }
    }
}

impl<'c> Machine<'c> {
    pub fn new(class: &'c ClassFile, opts: EvalOptions) -> Self {
        Self { class, opts, heap: Vec::new(), system_out: None, out: Vec::new(), steps: 0 }
    }

    pub fn stdout_units(&self) -> &[u16] {
        &self.out
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn into_output(self) -> EvalOutput {
        EvalOutput { stdout_units: self.out, steps: self.steps }
    }

    /// `public static void main(String[])` avec un tableau d’arguments vide.
    pub fn run_main(&mut self) -> Result<()> {
        let args = self.alloc(Object::Args);
        self.invoke_own("main", MAIN_DESC, vec![Value::Ref(args)], 0)?;
        Ok(())
    }

    /// Appelle une primitive `static void name(Deque)` sur une pile préparée.
    ///
    /// `stack` : dernier élément = sommet. Relu après l’appel.
    pub fn call_primitive(&mut self, name: &str, stack: &mut Vec<u16>) -> Result<()> {
        let mut cells = VecDeque::with_capacity(stack.len());
        for &c in stack.iter() {
            let cell = self.alloc(Object::Char(c));
            cells.push_front(Value::Ref(cell));
        }
        let deque = self.alloc(Object::Deque(cells));
        self.invoke_own(name, DEQUE_DESC, vec![Value::Ref(deque)], 0)?;

        let Object::Deque(cells) = &self.heap[deque] else {
            return Err(EvalError::Unsupported("pile remplacée".into()));
        };
        let mut result = Vec::with_capacity(cells.len());
        for v in cells.iter().rev() {
            match v {
                Value::Ref(r) => match &self.heap[*r] {
                    Object::Char(c) => result.push(*c),
                    other => return Err(EvalError::Unsupported(format!("cellule non Character: {other:?}"))),
                },
                other => return Err(EvalError::Unsupported(format!("cellule non référence: {other:?}"))),
            }
        }
        *stack = result;
        Ok(())
    }

    fn alloc(&mut self, o: Object) -> usize {
        self.heap.push(o);
        self.heap.len() - 1
    }

    fn invoke_own(&mut self, name: &str, desc: &str, args: Vec<Value>, depth: usize) -> Result<Option<Value>> {
        if depth >= self.opts.max_call_depth {
            return Err(EvalError::CallDepth(depth));
        }
        let class = self.class;
        let method = class
            .method(name, desc)
            .ok_or_else(|| EvalError::NoSuchMethod(format!("{name}{desc}")))?;
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| EvalError::NoSuchMethod(format!("{name}{desc} (sans Code)")))?;
        let insns = decode(&code.bytes)?;

        let mut locals = vec![Value::Null; usize::from(code.max_locals).max(args.len())];
        locals[..args.len()].copy_from_slice(&args);
        let mut stack: Vec<Value> = Vec::with_capacity(usize::from(code.max_stack));
        let mut ip = 0usize;

        while let Some(insn) = insns.get(ip).copied() {
            self.steps += 1;
            if let Some(limit) = self.opts.max_steps {
                if self.steps > limit {
                    return Err(EvalError::StepLimit(limit));
                }
            }
            let here = Here { method: name, offset: insn.offset };
            ip += 1;

            match insn.op {
                Opcode::IconstM1
                | Opcode::Iconst0
                | Opcode::Iconst1
                | Opcode::Iconst2
                | Opcode::Iconst3
                | Opcode::Iconst4
                | Opcode::Iconst5 => {
                    stack.push(Value::Int(i32::from(insn.op.byte()) - i32::from(Opcode::Iconst0.byte())));
                }
                Opcode::Bipush | Opcode::Sipush => match insn.operand {
                    Operand::Int(v) => stack.push(Value::Int(v)),
                    _ => return Err(here.mismatch("immédiat attendu")),
                },
                Opcode::Ldc | Opcode::LdcW => {
                    let Operand::Const(idx) = insn.operand else {
                        return Err(here.mismatch("index de constante attendu"));
                    };
                    match class.pool.get(idx) {
                        Some(Constant::Integer(v)) => stack.push(Value::Int(*v)),
                        other => return Err(EvalError::Unsupported(format!("ldc {other:?}"))),
                    }
                }
                Opcode::Aload | Opcode::Aload0 | Opcode::Aload1 | Opcode::Aload2 | Opcode::Aload3 => {
                    let slot = local_slot(&insn);
                    let v = *locals.get(slot).ok_or_else(|| here.mismatch(format!("local {slot} hors cadre")))?;
                    stack.push(v);
                }
                Opcode::Astore | Opcode::Astore0 | Opcode::Astore1 | Opcode::Astore2 | Opcode::Astore3 => {
                    let slot = local_slot(&insn);
                    let v = stack.pop().ok_or_else(|| here.underflow())?;
                    *locals.get_mut(slot).ok_or_else(|| here.mismatch(format!("local {slot} hors cadre")))? = v;
                }
                Opcode::Pop => {
                    stack.pop().ok_or_else(|| here.underflow())?;
                }
                Opcode::Dup => {
                    let v = *stack.last().ok_or_else(|| here.underflow())?;
                    stack.push(v);
                }
                Opcode::Dup2 => {
                    let n = stack.len();
                    if n < 2 {
                        return Err(here.underflow());
                    }
                    stack.extend_from_within(n - 2..);
                }
                Opcode::Swap => {
                    let n = stack.len();
                    if n < 2 {
                        return Err(here.underflow());
                    }
                    stack.swap(n - 1, n - 2);
                }
                Opcode::Iadd | Opcode::Ixor => {
                    let b = pop_int(&mut stack, &here)?;
                    let a = pop_int(&mut stack, &here)?;
                    let r = if insn.op == Opcode::Iadd { a.wrapping_add(b) } else { a ^ b };
                    stack.push(Value::Int(r));
                }
                Opcode::Ineg => {
                    let a = pop_int(&mut stack, &here)?;
                    stack.push(Value::Int(a.wrapping_neg()));
                }
                Opcode::I2c => {
                    let a = pop_int(&mut stack, &here)?;
                    stack.push(Value::Int(i32::from(a as u16)));
                }
                Opcode::Ifeq | Opcode::Ifne | Opcode::Goto => {
                    let Operand::Branch(target) = insn.operand else {
                        return Err(here.mismatch("cible de saut attendue"));
                    };
                    let taken = match insn.op {
                        Opcode::Goto => true,
                        Opcode::Ifeq => pop_int(&mut stack, &here)? == 0,
                        _ => pop_int(&mut stack, &here)? != 0,
                    };
                    if taken {
                        ip = insns
                            .binary_search_by_key(&target, |i| i.offset)
                            .map_err(|_| here.mismatch(format!("saut au milieu d’une instruction ({target})")))?;
                    }
                }
                Opcode::Return => return Ok(None),
                Opcode::Getstatic => {
                    let m = member(class, &insn)?;
                    if (m.0.as_str(), m.1.as_str()) != ("java/lang/System", "out") {
                        return Err(EvalError::Unsupported(format!("getstatic {}.{}", m.0, m.1)));
                    }
                    let out = match self.system_out {
                        Some(r) => r,
                        None => {
                            let r = self.alloc(Object::PrintStream);
                            self.system_out = Some(r);
                            r
                        }
                    };
                    stack.push(Value::Ref(out));
                }
                Opcode::New => {
                    let name = type_operand(class, &insn)?;
                    let obj = match name {
                        "java/util/ArrayDeque" => Object::Deque(VecDeque::new()),
                        _ => Object::Plain,
                    };
                    let r = self.alloc(obj);
                    stack.push(Value::Ref(r));
                }
                Opcode::Checkcast => {
                    let name = type_operand(class, &insn)?;
                    let v = *stack.last().ok_or_else(|| here.underflow())?;
                    if let Value::Ref(r) = v {
                        let ok = match (name, &self.heap[r]) {
                            ("java/lang/Character", o) => matches!(o, Object::Char(_)),
                            ("java/util/Deque" | "java/util/ArrayDeque", o) => matches!(o, Object::Deque(_)),
                            _ => true,
                        };
                        if !ok {
                            return Err(here.exception("java.lang.ClassCastException"));
                        }
                    }
                }
                Opcode::Invokestatic | Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokeinterface => {
                    let (owner, mname, mdesc) = member(class, &insn)?;
                    let md = MethodDescriptor::parse(&mdesc)?;
                    let argc = md.params.len();
                    if stack.len() < argc {
                        return Err(here.underflow());
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let receiver = if insn.op == Opcode::Invokestatic {
                        None
                    } else {
                        Some(stack.pop().ok_or_else(|| here.underflow())?)
                    };

                    let own = class.name()? == owner;
                    let ret = if own && insn.op == Opcode::Invokestatic {
                        self.invoke_own(&mname, &mdesc, args, depth + 1)?
                    } else {
                        self.call_library(&here, &owner, &mname, &mdesc, receiver, &args)?
                    };
                    if let Some(v) = ret {
                        stack.push(v);
                    }
                }
            }
        }
        // fin de code sans `return` : le vérificateur l’aurait refusé
        Err(EvalError::Unsupported(format!("{name}{desc} sort de son code")))
    }

    /// Stubs de la bibliothèque Java touchée par les classes Kemuri.
    fn call_library(
        &mut self,
        here: &Here<'_>,
        owner: &str,
        name: &str,
        desc: &str,
        receiver: Option<Value>,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let this = match receiver {
            Some(Value::Ref(r)) => Some(r),
            Some(Value::Null) => return Err(here.exception("java.lang.NullPointerException")),
            Some(Value::Int(_)) => return Err(here.mismatch("receveur int")),
            None => None,
        };

        match (owner, name, desc) {
            ("java/lang/Object" | "java/util/ArrayDeque", "<init>", "()V") => Ok(None),
            (_, "<init>", "()V") if this.is_some_and(|r| matches!(self.heap[r], Object::Plain)) => Ok(None),

            ("java/util/Deque" | "java/util/ArrayDeque", "push", "(Ljava/lang/Object;)V") => {
                let v = args[0];
                if v == Value::Null {
                    return Err(here.exception("java.lang.NullPointerException"));
                }
                self.deque(here, this)?.push_front(v);
                Ok(None)
            }
            ("java/util/Deque" | "java/util/ArrayDeque", "pop", "()Ljava/lang/Object;") => self
                .deque(here, this)?
                .pop_front()
                .map(Some)
                .ok_or_else(|| here.exception("java.util.NoSuchElementException")),
            ("java/util/Deque" | "java/util/ArrayDeque", "isEmpty", "()Z") => {
                let empty = self.deque(here, this)?.is_empty();
                Ok(Some(Value::Int(i32::from(empty))))
            }

            ("java/lang/Character", "valueOf", "(C)Ljava/lang/Character;") => {
                // la JVM ne rétrécit pas un int passé en `char` : `i2c` d’abord
                let Some(c) = (match args[0] {
                    Value::Int(v) => u16::try_from(v).ok(),
                    _ => None,
                }) else {
                    return Err(here.mismatch(format!("char attendu, reçu {:?}", args[0])));
                };
                let r = self.alloc(Object::Char(c));
                Ok(Some(Value::Ref(r)))
            }
            ("java/lang/Character", "charValue", "()C") => match this.map(|r| &self.heap[r]) {
                Some(Object::Char(c)) => Ok(Some(Value::Int(i32::from(*c)))),
                _ => Err(here.mismatch("Character attendu")),
            },

            ("java/io/PrintStream", "print", "(C)V") => {
                match (this.map(|r| &self.heap[r]), args[0]) {
                    (Some(Object::PrintStream), Value::Int(c)) => self.out.push(c as u16),
                    _ => return Err(here.mismatch("PrintStream.print(char)")),
                }
                Ok(None)
            }

            _ => Err(EvalError::Unsupported(format!("{owner}.{name}{desc}"))),
        }
    }

    fn deque(&mut self, here: &Here<'_>, this: Option<usize>) -> Result<&mut VecDeque<Value>> {
        match this.map(|r| &mut self.heap[r]) {
            Some(Object::Deque(d)) => Ok(d),
            _ => Err(here.mismatch("Deque attendu")),
        }
    }
}

fn local_slot(insn: &Instruction) -> usize {
    match (insn.op, insn.operand) {
        (_, Operand::Local(slot)) => usize::from(slot),
        (Opcode::Aload0 | Opcode::Astore0, _) => 0,
        (Opcode::Aload1 | Opcode::Astore1, _) => 1,
        (Opcode::Aload2 | Opcode::Astore2, _) => 2,
        _ => 3,
    }
}

fn pop_int(stack: &mut Vec<Value>, here: &Here<'_>) -> Result<i32> {
    match stack.pop() {
        Some(Value::Int(v)) => Ok(v),
        Some(other) => Err(here.mismatch(format!("int attendu, trouvé {other:?}"))),
        None => Err(here.underflow()),
    }
}

fn member(class: &ClassFile, insn: &Instruction) -> Result<(String, String, String)> {
    let idx = match insn.operand {
        Operand::Const(idx) | Operand::Interface { index: idx, .. } => idx,
        _ => return Err(EvalError::Unsupported(format!("{} sans référence", insn.op.mnemonic()))),
    };
    let m = class.pool.member_ref_at(idx)?;
    Ok((m.owner.to_owned(), m.name.to_owned(), m.descriptor.to_owned()))
}

fn type_operand<'a>(class: &'a ClassFile, insn: &Instruction) -> Result<&'a str> {
    match insn.operand {
        Operand::Const(idx) => Ok(class.pool.class_name_at(idx)?),
        _ => Err(EvalError::Unsupported(format!("{} sans classe", insn.op.mnemonic()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::access;
    use crate::ClassBuilder;
    use pretty_assertions::assert_eq;

    const DEQUE: &str = "java/util/Deque";

    /// Classe de test : `swap2(Deque)` échange les deux cellules du sommet,
    /// `main` imprime 'A' puis 'B' via une pile.
    fn demo() -> ClassFile {
        let mut cb = ClassBuilder::new("t/Demo", "java/lang/Object", access::PUBLIC).unwrap();
        cb.method(access::STATIC, "swap2", DEQUE_DESC, |c| {
            c.load_ref(0)?;
            c.insn(Opcode::Dup)?;
            c.invoke_interface(DEQUE, "pop", "()Ljava/lang/Object;")?;
            c.insn(Opcode::Swap)?;
            c.insn(Opcode::Dup)?;
            c.invoke_interface(DEQUE, "pop", "()Ljava/lang/Object;")?;
            c.store_ref(1)?;
            c.insn(Opcode::Swap)?;
            c.insn(Opcode::Dup2)?;
            c.invoke_interface(DEQUE, "push", "(Ljava/lang/Object;)V")?;
            c.insn(Opcode::Pop)?;
            c.load_ref(1)?;
            c.invoke_interface(DEQUE, "push", "(Ljava/lang/Object;)V")?;
            c.insn(Opcode::Return)
        })
        .unwrap();
        cb.method(access::PUBLIC | access::STATIC, "main", MAIN_DESC, |c| {
            c.get_static("java/lang/System", "out", "Ljava/io/PrintStream;")?;
            c.insn(Opcode::Dup)?;
            c.push_int(65)?;
            c.invoke_virtual("java/io/PrintStream", "print", "(C)V")?;
            c.push_int(66)?;
            c.invoke_virtual("java/io/PrintStream", "print", "(C)V")?;
            c.insn(Opcode::Return)
        })
        .unwrap();
        ClassFile::parse(&cb.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn char_arguments_must_be_narrowed() {
        let mut cb = ClassBuilder::new("t/Chars", "java/lang/Object", access::PUBLIC).unwrap();
        for (name, narrow) in [("raw", false), ("narrowed", true)] {
            cb.method(access::STATIC, name, DEQUE_DESC, |c| {
                c.load_ref(0)?;
                c.push_int(-45)?;
                if narrow {
                    c.insn(Opcode::I2c)?;
                }
                c.invoke_static("java/lang/Character", "valueOf", "(C)Ljava/lang/Character;")?;
                c.invoke_interface(DEQUE, "push", "(Ljava/lang/Object;)V")?;
                c.insn(Opcode::Return)
            })
            .unwrap();
        }
        let cf = ClassFile::parse(&cb.to_bytes().unwrap()).unwrap();
        let mut m = Machine::new(&cf, EvalOptions::default());

        let mut stack = Vec::new();
        m.call_primitive("narrowed", &mut stack).unwrap();
        assert_eq!(stack, vec![0xFFD3]);

        let err = m.call_primitive("raw", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn main_output_is_captured() {
        let out = run_main(&demo(), EvalOptions::default()).unwrap();
        assert_eq!(out.stdout_string(), "AB");
        assert!(out.steps > 0);
    }

    #[test]
    fn primitive_on_prepared_stack() {
        let cf = demo();
        let mut m = Machine::new(&cf, EvalOptions::default());
        let mut stack = vec![1, 2, 3];
        m.call_primitive("swap2", &mut stack).unwrap();
        assert_eq!(stack, vec![1, 3, 2]);
    }

    #[test]
    fn popping_empty_deque_raises() {
        let cf = demo();
        let mut m = Machine::new(&cf, EvalOptions::default());
        let err = m.call_primitive("swap2", &mut vec![7]).unwrap_err();
        assert!(
            matches!(err, EvalError::Exception { class: "java.util.NoSuchElementException", .. }),
            "{err}"
        );
    }

    #[test]
    fn step_limit_stops_runaway_code() {
        let mut cb = ClassBuilder::new("t/Spin", "java/lang/Object", access::PUBLIC).unwrap();
        cb.method(access::PUBLIC | access::STATIC, "main", MAIN_DESC, |c| {
            let top = c.new_label();
            c.bind(top)?;
            c.jump(Opcode::Goto, top)
        })
        .unwrap();
        let cf = ClassFile::parse(&cb.to_bytes().unwrap()).unwrap();
        let err = run_main(&cf, EvalOptions { max_steps: Some(100), ..EvalOptions::default() }).unwrap_err();
        assert!(matches!(err, EvalError::StepLimit(100)));
    }

    #[test]
    fn missing_method_is_reported() {
        let cf = demo();
        let mut m = Machine::new(&cf, EvalOptions::default());
        assert!(matches!(m.call_primitive("nope", &mut vec![]), Err(EvalError::NoSuchMethod(_))));
    }
}
