//! opcode.rs — Sous-ensemble d’opcodes JVM utilisé par Kemuri.
//!
//! Design :
//! - **Fermé** : seulement ce que l’émetteur produit et ce que l’évaluateur
//!   sait exécuter ; tout autre octet est une erreur de décodage
//! - **Pratique** : helpers `mnemonic()`, `operand_len()`, `stack_delta()`,
//!   `is_branch()`, `ends_block()`
//! - Décodage d’un tableau `code` en [`Instruction`]s (désasm, évaluateur)

use crate::{ClassFileError, Result};

/// Jeu d’instructions supporté. La valeur de chaque variante est l’octet JVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ----- Constantes -----
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,

    // ----- Locals (références) -----
    Aload = 0x19,
    Aload0 = 0x2a,
    Aload1 = 0x2b,
    Aload2 = 0x2c,
    Aload3 = 0x2d,
    Astore = 0x3a,
    Astore0 = 0x4b,
    Astore1 = 0x4c,
    Astore2 = 0x4d,
    Astore3 = 0x4e,

    // ----- Pile -----
    Pop = 0x57,
    Dup = 0x59,
    Dup2 = 0x5c,
    Swap = 0x5f,

    // ----- Arith (int) -----
    Iadd = 0x60,
    Ineg = 0x74,
    Ixor = 0x82,
    I2c = 0x92,

    // ----- Contrôle -----
    Ifeq = 0x99,
    Ifne = 0x9a,
    Goto = 0xa7,
    Return = 0xb1,

    // ----- Champs / appels / objets -----
    Getstatic = 0xb2,
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    Invokeinterface = 0xb9,
    New = 0xbb,
    Checkcast = 0xc0,
}

impl Opcode {
    pub fn from_byte(b: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match b {
            0x02 => IconstM1,
            0x03 => Iconst0,
            0x04 => Iconst1,
            0x05 => Iconst2,
            0x06 => Iconst3,
            0x07 => Iconst4,
            0x08 => Iconst5,
            0x10 => Bipush,
            0x11 => Sipush,
            0x12 => Ldc,
            0x13 => LdcW,
            0x19 => Aload,
            0x2a => Aload0,
            0x2b => Aload1,
            0x2c => Aload2,
            0x2d => Aload3,
            0x3a => Astore,
            0x4b => Astore0,
            0x4c => Astore1,
            0x4d => Astore2,
            0x4e => Astore3,
            0x57 => Pop,
            0x59 => Dup,
            0x5c => Dup2,
            0x5f => Swap,
            0x60 => Iadd,
            0x74 => Ineg,
            0x82 => Ixor,
            0x92 => I2c,
            0x99 => Ifeq,
            0x9a => Ifne,
            0xa7 => Goto,
            0xb1 => Return,
            0xb2 => Getstatic,
            0xb6 => Invokevirtual,
            0xb7 => Invokespecial,
            0xb8 => Invokestatic,
            0xb9 => Invokeinterface,
            0xbb => New,
            0xc0 => Checkcast,
            _ => return None,
        })
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Mnémonique `javap`.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            IconstM1 => "iconst_m1",
            Iconst0 => "iconst_0",
            Iconst1 => "iconst_1",
            Iconst2 => "iconst_2",
            Iconst3 => "iconst_3",
            Iconst4 => "iconst_4",
            Iconst5 => "iconst_5",
            Bipush => "bipush",
            Sipush => "sipush",
            Ldc => "ldc",
            LdcW => "ldc_w",
            Aload => "aload",
            Aload0 => "aload_0",
            Aload1 => "aload_1",
            Aload2 => "aload_2",
            Aload3 => "aload_3",
            Astore => "astore",
            Astore0 => "astore_0",
            Astore1 => "astore_1",
            Astore2 => "astore_2",
            Astore3 => "astore_3",
            Pop => "pop",
            Dup => "dup",
            Dup2 => "dup2",
            Swap => "swap",
            Iadd => "iadd",
            Ineg => "ineg",
            Ixor => "ixor",
            I2c => "i2c",
            Ifeq => "ifeq",
            Ifne => "ifne",
            Goto => "goto",
            Return => "return",
            Getstatic => "getstatic",
            Invokevirtual => "invokevirtual",
            Invokespecial => "invokespecial",
            Invokestatic => "invokestatic",
            Invokeinterface => "invokeinterface",
            New => "new",
            Checkcast => "checkcast",
        }
    }

    /// Nombre d’octets d’opérandes après l’opcode.
    pub fn operand_len(self) -> usize {
        use Opcode::*;
        match self {
            Bipush | Ldc | Aload | Astore => 1,
            Sipush | LdcW | Ifeq | Ifne | Goto | Getstatic | Invokevirtual | Invokespecial
            | Invokestatic | New | Checkcast => 2,
            Invokeinterface => 4,
            _ => 0,
        }
    }

    /// Variation **statique** de la profondeur de pile (en slots).
    ///
    /// `None` pour les accès champs et les appels : le delta dépend du
    /// descripteur référencé.
    pub fn stack_delta(self) -> Option<i32> {
        use Opcode::*;
        match self {
            IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5 | Bipush
            | Sipush | Ldc | LdcW => Some(1),
            Aload | Aload0 | Aload1 | Aload2 | Aload3 => Some(1),
            Astore | Astore0 | Astore1 | Astore2 | Astore3 => Some(-1),
            Pop => Some(-1),
            Dup => Some(1),
            Dup2 => Some(2),
            Swap | Ineg | I2c | Checkcast => Some(0),
            Iadd | Ixor => Some(-1),
            Ifeq | Ifne => Some(-1),
            Goto | Return => Some(0),
            New => Some(1),
            Getstatic | Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => None,
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Ifeq | Opcode::Ifne | Opcode::Goto)
    }

    /// Vrai si l’instruction suivante n’est pas atteignable en séquence.
    pub fn ends_block(self) -> bool {
        matches!(self, Opcode::Goto | Opcode::Return)
    }
}

/// Opérande décodé d’une instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Immédiat de `bipush`/`sipush`.
    Int(i32),
    /// Slot de variable locale (`aload n`, `astore n`).
    Local(u8),
    /// Index dans le pool (ldc, champs, méthodes, classes).
    Const(u16),
    /// Cible **absolue** d’un saut.
    Branch(usize),
    /// `invokeinterface` : index + compteur d’arguments (receveur inclus).
    Interface { index: u16, count: u8 },
}

/// Instruction décodée, positionnée par son offset dans `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Opcode,
    pub operand: Operand,
}

/// Décode un tableau `code` complet.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut out = Vec::with_capacity(code.len() / 2);
    let mut pc = 0usize;
    while pc < code.len() {
        let byte = code[pc];
        let op = Opcode::from_byte(byte).ok_or(ClassFileError::UnknownOpcode { offset: pc, byte })?;
        let n = op.operand_len();
        let raw = code.get(pc + 1..pc + 1 + n).ok_or(ClassFileError::Truncated(pc))?;
        let u16_at = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
        let operand = match op {
            Opcode::Bipush => Operand::Int(i32::from(raw[0] as i8)),
            Opcode::Sipush => Operand::Int(i32::from(u16_at(0) as i16)),
            Opcode::Ldc => Operand::Const(u16::from(raw[0])),
            Opcode::Aload | Opcode::Astore => Operand::Local(raw[0]),
            Opcode::Ifeq | Opcode::Ifne | Opcode::Goto => {
                let rel = i64::from(u16_at(0) as i16);
                let target = pc as i64 + rel;
                if target < 0 || target as usize >= code.len() {
                    return Err(ClassFileError::BranchOutOfRange(rel));
                }
                Operand::Branch(target as usize)
            }
            Opcode::Invokeinterface => Operand::Interface { index: u16_at(0), count: raw[2] },
            _ if n == 2 => Operand::Const(u16_at(0)),
            _ => Operand::None,
        };
        out.push(Instruction { offset: pc, op, operand });
        pc += 1 + n;
    }
    Ok(out)
}
