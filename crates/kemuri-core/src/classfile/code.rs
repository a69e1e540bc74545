//! code.rs — Construction du tableau `code` d’une méthode.
//!
//! Le `CodeBuilder` émet les instructions **et** tient la comptabilité que
//! le vérificateur JVM exige :
//! - profondeur courante de la pile d’opérandes + maximum atteint
//! - plus haut slot local touché (`max_locals`)
//! - labels : profondeur relevée au premier saut / à la liaison, qui doivent
//!   concorder ; offsets des sauts patchés dans `finish()`
//!
//! Après un `goto` ou un `return`, la profondeur devient inconnue jusqu’au
//! prochain label lié (code mort : aucun suivi).

use super::constant_pool::ConstantPool;
use super::descriptor::{FieldType, MethodDescriptor};
use super::opcode::Opcode;
use crate::{ClassFileError, Result};

/// Taille maximale du tableau `code` d’une méthode (JVMS §4.7.3).
pub const MAX_CODE_LEN: usize = u16::MAX as usize;

/// Cible de saut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

#[derive(Debug, Default, Clone, Copy)]
struct LabelState {
    offset: Option<usize>,
    depth: Option<u16>,
}

/// Saut à patcher : offset de l’opcode, offset des 2 octets, label visé.
#[derive(Debug)]
struct Fixup {
    at: usize,
    patch: usize,
    label: Label,
}

/// Résultat final : ce qui part dans l’attribut `Code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
}

pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    code: Vec<u8>,
    depth: Option<u16>,
    max_stack: u16,
    max_locals: u16,
    labels: Vec<LabelState>,
    fixups: Vec<Fixup>,
}

impl<'p> CodeBuilder<'p> {
    /// `param_slots` inclut `this` pour une méthode d’instance.
    pub fn new(pool: &'p mut ConstantPool, param_slots: u16) -> Self {
        Self {
            pool,
            code: Vec::new(),
            depth: Some(0),
            max_stack: 0,
            max_locals: param_slots,
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Profondeur courante (`None` en code mort).
    pub fn depth(&self) -> Option<u16> {
        self.depth
    }

    /* ----- Comptabilité ----- */

    fn adjust(&mut self, delta: i32, at: usize) -> Result<()> {
        let Some(depth) = self.depth else {
            return Ok(());
        };
        let next = i32::from(depth) + delta;
        if next < 0 {
            return Err(ClassFileError::StackUnderflow { offset: at });
        }
        let next = u16::try_from(next).map_err(|_| ClassFileError::StackOverflow { offset: at })?;
        self.depth = Some(next);
        self.max_stack = self.max_stack.max(next);
        Ok(())
    }

    fn touch_local(&mut self, slot: u8, slots: u16) {
        self.max_locals = self.max_locals.max(u16::from(slot) + slots);
    }

    /// Émet l’opcode puis applique `delta` ; en fin de bloc, passe en code mort.
    fn emit_op(&mut self, op: Opcode, delta: i32) -> Result<usize> {
        let at = self.code.len();
        self.code.push(op.byte());
        self.adjust(delta, at)?;
        Ok(at)
    }

    fn after(&mut self, op: Opcode) {
        if op.ends_block() {
            self.depth = None;
        }
    }

    /* ----- Instructions ----- */

    /// Instruction sans opérande à delta statique (`dup`, `pop`, `ixor`, `return`…).
    pub fn insn(&mut self, op: Opcode) -> Result<()> {
        if op.operand_len() != 0 {
            return Err(ClassFileError::BadInstruction(op.mnemonic(), "attend un opérande"));
        }
        let delta = op
            .stack_delta()
            .ok_or(ClassFileError::BadInstruction(op.mnemonic(), "delta dépendant d’un descripteur"))?;
        self.emit_op(op, delta)?;
        self.after(op);
        Ok(())
    }

    /// `aload` (forme courte pour les slots 0..=3).
    pub fn load_ref(&mut self, slot: u8) -> Result<()> {
        let short = [Opcode::Aload0, Opcode::Aload1, Opcode::Aload2, Opcode::Aload3];
        match short.get(slot as usize) {
            Some(&op) => {
                self.emit_op(op, 1)?;
            }
            None => {
                self.emit_op(Opcode::Aload, 1)?;
                self.code.push(slot);
            }
        }
        self.touch_local(slot, 1);
        Ok(())
    }

    /// `astore` (forme courte pour les slots 0..=3).
    pub fn store_ref(&mut self, slot: u8) -> Result<()> {
        let short = [Opcode::Astore0, Opcode::Astore1, Opcode::Astore2, Opcode::Astore3];
        match short.get(slot as usize) {
            Some(&op) => {
                self.emit_op(op, -1)?;
            }
            None => {
                self.emit_op(Opcode::Astore, -1)?;
                self.code.push(slot);
            }
        }
        self.touch_local(slot, 1);
        Ok(())
    }

    /// Pousse un `int` avec la forme la plus courte.
    pub fn push_int(&mut self, v: i32) -> Result<()> {
        let iconst = [
            Opcode::IconstM1,
            Opcode::Iconst0,
            Opcode::Iconst1,
            Opcode::Iconst2,
            Opcode::Iconst3,
            Opcode::Iconst4,
            Opcode::Iconst5,
        ];
        if (-1..=5).contains(&v) {
            self.emit_op(iconst[(v + 1) as usize], 1)?;
        } else if let Ok(b) = i8::try_from(v) {
            self.emit_op(Opcode::Bipush, 1)?;
            self.code.push(b as u8);
        } else if let Ok(s) = i16::try_from(v) {
            self.emit_op(Opcode::Sipush, 1)?;
            self.code.extend_from_slice(&s.to_be_bytes());
        } else {
            self.ldc_int(v)?;
        }
        Ok(())
    }

    /// `ldc`/`ldc_w` d’une `CONSTANT_Integer`.
    pub fn ldc_int(&mut self, v: i32) -> Result<()> {
        let idx = self.pool.integer(v)?;
        match u8::try_from(idx) {
            Ok(small) => {
                self.emit_op(Opcode::Ldc, 1)?;
                self.code.push(small);
            }
            Err(_) => {
                self.emit_op(Opcode::LdcW, 1)?;
                self.code.extend_from_slice(&idx.to_be_bytes());
            }
        }
        Ok(())
    }

    /// `new` / `checkcast` sur un nom interne de classe.
    pub fn type_insn(&mut self, op: Opcode, class: &str) -> Result<()> {
        if !matches!(op, Opcode::New | Opcode::Checkcast) {
            return Err(ClassFileError::BadInstruction(op.mnemonic(), "pas une instruction de type"));
        }
        let idx = self.pool.class(class)?;
        let delta = op.stack_delta().unwrap_or(0);
        self.emit_op(op, delta)?;
        self.code.extend_from_slice(&idx.to_be_bytes());
        Ok(())
    }

    /// `getstatic owner.name : descriptor`.
    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let ty = FieldType::parse(descriptor)?;
        let idx = self.pool.field_ref(owner, name, descriptor)?;
        self.emit_op(Opcode::Getstatic, i32::from(ty.slots()))?;
        self.code.extend_from_slice(&idx.to_be_bytes());
        Ok(())
    }

    fn invoke(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let md = MethodDescriptor::parse(descriptor)?;
        let receiver = i32::from(op != Opcode::Invokestatic);
        let consumed = i32::from(md.param_slots()) + receiver;
        let delta = i32::from(md.return_slots()) - consumed;

        let idx = if op == Opcode::Invokeinterface {
            self.pool.interface_method_ref(owner, name, descriptor)?
        } else {
            self.pool.method_ref(owner, name, descriptor)?
        };
        // Les arguments doivent être présents avant l’appel.
        if let Some(depth) = self.depth {
            if i32::from(depth) < consumed {
                return Err(ClassFileError::StackUnderflow { offset: self.code.len() });
            }
        }
        self.emit_op(op, delta)?;
        self.code.extend_from_slice(&idx.to_be_bytes());
        if op == Opcode::Invokeinterface {
            let count = u8::try_from(consumed).map_err(|_| {
                ClassFileError::BadInstruction(op.mnemonic(), "trop d’arguments")
            })?;
            self.code.push(count);
            self.code.push(0);
        }
        Ok(())
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor)
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor)
    }

    /* ----- Labels & sauts ----- */

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label((self.labels.len() - 1) as u32)
    }

    fn state(&mut self, label: Label) -> &mut LabelState {
        &mut self.labels[label.0 as usize]
    }

    /// Relève (ou vérifie) la profondeur attendue à `label`.
    fn merge_depth(&mut self, label: Label, depth: Option<u16>) -> Result<Option<u16>> {
        let state = self.state(label);
        match (state.depth, depth) {
            (Some(expected), Some(found)) if expected != found => {
                Err(ClassFileError::LabelDepthMismatch { label: label.0, expected, found })
            }
            (Some(known), _) | (None, Some(known)) => {
                state.depth = Some(known);
                Ok(Some(known))
            }
            (None, None) => Ok(None),
        }
    }

    /// `ifeq`/`ifne`/`goto` vers `label` (offset patché dans `finish`).
    pub fn jump(&mut self, op: Opcode, label: Label) -> Result<()> {
        if !op.is_branch() {
            return Err(ClassFileError::BadInstruction(op.mnemonic(), "pas un saut"));
        }
        let delta = op.stack_delta().unwrap_or(0);
        let at = self.emit_op(op, delta)?;
        self.merge_depth(label, self.depth)?;
        let patch = self.code.len();
        self.code.extend_from_slice(&[0, 0]);
        self.fixups.push(Fixup { at, patch, label });
        self.after(op);
        Ok(())
    }

    /// Lie `label` à l’offset courant.
    pub fn bind(&mut self, label: Label) -> Result<()> {
        let offset = self.code.len();
        let state = self.state(label);
        if state.offset.is_some() {
            return Err(ClassFileError::LabelAlreadyBound(label.0));
        }
        state.offset = Some(offset);
        self.depth = self.merge_depth(label, self.depth)?;
        Ok(())
    }

    /// Patch des sauts, contrôles finaux, et `Code` prêt à écrire.
    pub fn finish(mut self) -> Result<Code> {
        for fix in &self.fixups {
            let target = self.labels[fix.label.0 as usize]
                .offset
                .ok_or(ClassFileError::UnboundLabel(fix.label.0))?;
            let rel = target as i64 - fix.at as i64;
            let rel16 = i16::try_from(rel).map_err(|_| ClassFileError::BranchOutOfRange(rel))?;
            self.code[fix.patch..fix.patch + 2].copy_from_slice(&rel16.to_be_bytes());
        }
        if self.code.len() > MAX_CODE_LEN {
            return Err(ClassFileError::CodeTooLarge(self.code.len()));
        }
        Ok(Code { max_stack: self.max_stack, max_locals: self.max_locals, bytes: self.code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::opcode::{decode, Operand};
    use pretty_assertions::assert_eq;

    const DEQUE: &str = "java/util/Deque";

    #[test]
    fn tracks_depth_through_invokes() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 1);
        cb.load_ref(0).unwrap(); // 1
        cb.insn(Opcode::Dup).unwrap(); // 2
        cb.invoke_interface(DEQUE, "pop", "()Ljava/lang/Object;").unwrap(); // 2
        cb.insn(Opcode::Dup2).unwrap(); // 4
        cb.invoke_interface(DEQUE, "push", "(Ljava/lang/Object;)V").unwrap(); // 2
        cb.invoke_interface(DEQUE, "push", "(Ljava/lang/Object;)V").unwrap(); // 0
        assert_eq!(cb.depth(), Some(0));
        cb.insn(Opcode::Return).unwrap();
        let code = cb.finish().unwrap();
        assert_eq!((code.max_stack, code.max_locals), (4, 1));
    }

    #[test]
    fn locals_grow_with_stores() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 1);
        cb.load_ref(0).unwrap();
        cb.store_ref(3).unwrap();
        cb.load_ref(7).unwrap();
        cb.insn(Opcode::Pop).unwrap();
        cb.insn(Opcode::Return).unwrap();
        let code = cb.finish().unwrap();
        assert_eq!(code.max_locals, 8);
        assert_eq!(code.bytes, vec![0x2a, 0x4e, 0x19, 7, 0x57, 0xb1]);
    }

    #[test]
    fn push_int_picks_short_forms() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 0);
        for v in [-1, 5, 72, 255, 70_000] {
            cb.push_int(v).unwrap();
        }
        let code = cb.finish().unwrap();
        let ops: Vec<_> = decode(&code.bytes).unwrap().into_iter().map(|i| (i.op, i.operand)).collect();
        assert_eq!(
            ops,
            vec![
                (Opcode::IconstM1, Operand::None),
                (Opcode::Iconst5, Operand::None),
                (Opcode::Bipush, Operand::Int(72)),
                (Opcode::Sipush, Operand::Int(255)),
                (Opcode::Ldc, Operand::Const(1)),
            ]
        );
        assert_eq!(code.max_stack, 5);
        assert_eq!(pool.get(1), Some(&crate::Constant::Integer(70_000)));
    }

    #[test]
    fn loop_labels_patch_both_directions() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 1);
        let start = cb.new_label();
        let end = cb.new_label();
        cb.bind(start).unwrap();
        cb.load_ref(0).unwrap(); // 0
        cb.invoke_interface(DEQUE, "isEmpty", "()Z").unwrap(); // 1
        cb.jump(Opcode::Ifne, end).unwrap(); // 6
        cb.jump(Opcode::Goto, start).unwrap(); // 9
        assert_eq!(cb.depth(), None);
        cb.bind(end).unwrap(); // 12
        assert_eq!(cb.depth(), Some(0));
        cb.insn(Opcode::Return).unwrap();
        let code = cb.finish().unwrap();

        let insns = decode(&code.bytes).unwrap();
        assert_eq!(insns[2].operand, Operand::Branch(12));
        assert_eq!(insns[3].operand, Operand::Branch(0));
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn label_depth_mismatch_is_an_error() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 1);
        let target = cb.new_label();
        cb.load_ref(0).unwrap();
        cb.load_ref(0).unwrap();
        cb.invoke_interface(DEQUE, "isEmpty", "()Z").unwrap();
        cb.jump(Opcode::Ifne, target).unwrap(); // profondeur 1 au saut
        cb.insn(Opcode::Pop).unwrap();
        let err = cb.bind(target).unwrap_err(); // profondeur 0 ici
        assert!(matches!(err, ClassFileError::LabelDepthMismatch { expected: 1, found: 0, .. }));
    }

    #[test]
    fn underflow_and_unbound_are_errors() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 0);
        assert!(matches!(cb.insn(Opcode::Pop), Err(ClassFileError::StackUnderflow { offset: 0 })));

        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 0);
        assert!(cb.invoke_static("A", "f", "(I)V").is_err());

        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 0);
        let nowhere = cb.new_label();
        cb.jump(Opcode::Goto, nowhere).unwrap();
        assert!(matches!(cb.finish(), Err(ClassFileError::UnboundLabel(0))));
    }

    #[test]
    fn misuse_of_insn_is_rejected() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 0);
        assert!(cb.insn(Opcode::Bipush).is_err());
        assert!(cb.insn(Opcode::Invokestatic).is_err());
        assert!(cb.type_insn(Opcode::Dup, "A").is_err());
        assert!(cb.jump(Opcode::Dup, Label(0)).is_err());
    }

    #[test]
    fn oversized_code_is_rejected() {
        let mut pool = ConstantPool::new();
        let mut cb = CodeBuilder::new(&mut pool, 1);
        cb.load_ref(0).unwrap();
        for _ in 0..MAX_CODE_LEN {
            cb.insn(Opcode::Dup).unwrap();
            cb.insn(Opcode::Pop).unwrap();
        }
        assert!(matches!(cb.finish(), Err(ClassFileError::CodeTooLarge(_))));
    }
}
