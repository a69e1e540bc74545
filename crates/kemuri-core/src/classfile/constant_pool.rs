//! constant_pool.rs — Pool de constantes d’une classe JVM.
//!
//! - Entrées supportées : Utf8, Integer, Class, String, Fieldref, Methodref,
//!   InterfaceMethodref, NameAndType (rien d’autre n’est émis par Kemuri)
//! - Dé-dupe : une même constante n’occupe qu’un index
//! - Index 1-based, comme dans le format (l’index 0 est réservé)
//! - Encodage *utf8 modifié* pour les `CONSTANT_Utf8`

use std::collections::HashMap;

use crate::{ClassFileError, Result};

/// Tags des constantes (JVMS §4.4).
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
}

/// Plus grand index utilisable (`constant_pool_count` tient sur un u16).
const MAX_ENTRIES: usize = u16::MAX as usize - 1;

/// Une entrée du pool. Les champs `u16` sont des index dans ce même pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Class { name: u16 },
    String { value: u16 },
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => tag::UTF8,
            Constant::Integer(_) => tag::INTEGER,
            Constant::Class { .. } => tag::CLASS,
            Constant::String { .. } => tag::STRING,
            Constant::Fieldref { .. } => tag::FIELDREF,
            Constant::Methodref { .. } => tag::METHODREF,
            Constant::InterfaceMethodref { .. } => tag::INTERFACE_METHODREF,
            Constant::NameAndType { .. } => tag::NAME_AND_TYPE,
        }
    }
}

/// Référence de membre résolue (propriétaire, nom, descripteur).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Pool de constantes avec dé-dupe de toutes les entrées.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<Constant, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruit un pool depuis des entrées relues (l’ordre est conservé).
    pub fn from_entries(entries: Vec<Constant>) -> Result<Self> {
        if entries.len() > MAX_ENTRIES {
            return Err(ClassFileError::ConstantPoolOverflow(entries.len()));
        }
        let mut index = HashMap::with_capacity(entries.len());
        for (i, c) in entries.iter().enumerate() {
            // la première occurrence gagne, comme à l’insertion
            index.entry(c.clone()).or_insert((i + 1) as u16);
        }
        Ok(Self { entries, index })
    }

    /// Ajoute (ou retrouve) une constante ; renvoie son index 1-based.
    pub fn add(&mut self, c: Constant) -> Result<u16> {
        if let Some(&idx) = self.index.get(&c) {
            return Ok(idx);
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ClassFileError::ConstantPoolOverflow(self.entries.len() + 1));
        }
        if let Constant::Utf8(s) = &c {
            let encoded = modified_utf8_len(s);
            if encoded > u16::MAX as usize {
                return Err(ClassFileError::Utf8TooLong(encoded));
            }
        }
        self.entries.push(c.clone());
        let idx = self.entries.len() as u16;
        self.index.insert(c, idx);
        Ok(idx)
    }

    pub fn utf8(&mut self, s: &str) -> Result<u16> {
        self.add(Constant::Utf8(s.to_owned()))
    }

    pub fn integer(&mut self, v: i32) -> Result<u16> {
        self.add(Constant::Integer(v))
    }

    /// `CONSTANT_Class` pour un nom interne (`java/lang/Object`).
    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.add(Constant::Class { name })
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(Constant::Fieldref { class, name_and_type })
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(Constant::Methodref { class, name_and_type })
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodref { class, name_and_type })
    }

    pub fn get(&self, idx: u16) -> Option<&Constant> {
        (idx as usize).checked_sub(1).and_then(|i| self.entries.get(i))
    }

    fn expect(&self, idx: u16) -> Result<&Constant> {
        self.get(idx).ok_or(ClassFileError::BadConstantRef(idx))
    }

    pub fn utf8_at(&self, idx: u16) -> Result<&str> {
        match self.expect(idx)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFileError::BadConstantRef(idx)),
        }
    }

    /// Nom interne d’une `CONSTANT_Class`.
    pub fn class_name_at(&self, idx: u16) -> Result<&str> {
        match self.expect(idx)? {
            Constant::Class { name } => self.utf8_at(*name),
            _ => Err(ClassFileError::BadConstantRef(idx)),
        }
    }

    /// (nom, descripteur) d’une `CONSTANT_NameAndType`.
    pub fn name_and_type_at(&self, idx: u16) -> Result<(&str, &str)> {
        match self.expect(idx)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8_at(*name)?, self.utf8_at(*descriptor)?))
            }
            _ => Err(ClassFileError::BadConstantRef(idx)),
        }
    }

    /// Résout un Fieldref/Methodref/InterfaceMethodref.
    pub fn member_ref_at(&self, idx: u16) -> Result<MemberRef<'_>> {
        match self.expect(idx)? {
            Constant::Fieldref { class, name_and_type }
            | Constant::Methodref { class, name_and_type }
            | Constant::InterfaceMethodref { class, name_and_type } => {
                let owner = self.class_name_at(*class)?;
                let (name, descriptor) = self.name_and_type_at(*name_and_type)?;
                Ok(MemberRef { owner, name, descriptor })
            }
            _ => Err(ClassFileError::BadConstantRef(idx)),
        }
    }

    /// Nombre d’entrées utiles (sans l’index 0).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries.iter().enumerate().map(|(i, c)| ((i + 1) as u16, c))
    }

    /// Écrit `constant_pool_count` puis les entrées.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        for c in &self.entries {
            out.push(c.tag());
            match c {
                Constant::Utf8(s) => {
                    let bytes = encode_modified_utf8(s);
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                Constant::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
                Constant::Class { name } => out.extend_from_slice(&name.to_be_bytes()),
                Constant::String { value } => out.extend_from_slice(&value.to_be_bytes()),
                Constant::Fieldref { class, name_and_type }
                | Constant::Methodref { class, name_and_type }
                | Constant::InterfaceMethodref { class, name_and_type } => {
                    out.extend_from_slice(&class.to_be_bytes());
                    out.extend_from_slice(&name_and_type.to_be_bytes());
                }
                Constant::NameAndType { name, descriptor } => {
                    out.extend_from_slice(&name.to_be_bytes());
                    out.extend_from_slice(&descriptor.to_be_bytes());
                }
            }
        }
    }
}

/* ───────────────────────────── utf8 modifié ───────────────────────────── */

fn modified_utf8_len(s: &str) -> usize {
    s.encode_utf16()
        .map(|u| match u {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Encode en utf8 modifié : par unité UTF-16, NUL sur deux octets.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for u in s.encode_utf16() {
        match u {
            0x0001..=0x007F => out.push(u as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (u >> 6) as u8);
                out.push(0x80 | (u & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (u >> 12) as u8);
                out.push(0x80 | ((u >> 6) & 0x3F) as u8);
                out.push(0x80 | (u & 0x3F) as u8);
            }
        }
    }
    out
}

/// Décode de l’utf8 modifié. Les surrogates orphelins sont rejetés.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let bad = |at: usize| ClassFileError::BadUtf8(format!("séquence invalide à l’octet {at}"));
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 && b != 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or_else(|| bad(i))?;
            if b2 & 0xC0 != 0x80 {
                return Err(bad(i));
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let (b2, b3) = match (bytes.get(i + 1), bytes.get(i + 2)) {
                (Some(&b2), Some(&b3)) if b2 & 0xC0 == 0x80 && b3 & 0xC0 == 0x80 => (b2, b3),
                _ => return Err(bad(i)),
            };
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return Err(bad(i));
        }
    }
    String::from_utf16(&units).map_err(|e| ClassFileError::BadUtf8(e.to_string()))
}
