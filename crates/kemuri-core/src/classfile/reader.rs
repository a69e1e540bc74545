//! reader.rs — Relecture d’un fichier `.class` en modèle `ClassFile`.
//!
//! Couvre ce que le writer produit (les 8 tags de constantes de Kemuri) ;
//! les attributs inconnus sont sautés, les champs et interfaces ignorés.

use super::code::Code;
use super::constant_pool::{decode_modified_utf8, tag, Constant, ConstantPool};
use super::MAGIC;
use crate::{ClassFileError, Result};

#[derive(Debug, Clone)]
pub struct Method {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub code: Option<Code>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub methods: Vec<Method>,
    pub source_file: Option<String>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        let mut r = Cursor { data: bytes, pos: 0 };

        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = read_pool(&mut r)?;

        let access = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interfaces = r.u16()? as usize;
        r.take(interfaces * 2)?;

        let fields = r.u16()?;
        for _ in 0..fields {
            r.take(6)?; // access, name, descriptor
            skip_attributes(&mut r)?;
        }

        let method_count = r.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access = r.u16()?;
            let name = pool.utf8_at(r.u16()?)?.to_owned();
            let descriptor = pool.utf8_at(r.u16()?)?.to_owned();
            let mut code = None;
            let attrs = r.u16()?;
            for _ in 0..attrs {
                let attr_name = pool.utf8_at(r.u16()?)?;
                let len = r.u32()? as usize;
                let body = r.take(len)?;
                if attr_name == "Code" {
                    code = Some(read_code(body, r.pos - len)?);
                }
            }
            methods.push(Method { access, name, descriptor, code });
        }

        let mut source_file = None;
        let attrs = r.u16()?;
        for _ in 0..attrs {
            let attr_name = pool.utf8_at(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            if attr_name == "SourceFile" && len == 2 {
                let idx = u16::from_be_bytes([body[0], body[1]]);
                source_file = Some(pool.utf8_at(idx)?.to_owned());
            }
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            pool,
            access,
            this_class,
            super_class,
            methods,
            source_file,
        })
    }

    /// Nom interne (`jp/example/Hello`).
    pub fn name(&self) -> Result<&str> {
        self.pool.class_name_at(self.this_class)
    }

    pub fn super_name(&self) -> Result<&str> {
        self.pool.class_name_at(self.super_class)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ClassFileError::Truncated(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(ClassFileError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn read_pool(r: &mut Cursor<'_>) -> Result<ConstantPool> {
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count.saturating_sub(1) as usize);
    for index in 1..count {
        let t = r.u8()?;
        let c = match t {
            tag::UTF8 => {
                let len = r.u16()? as usize;
                Constant::Utf8(decode_modified_utf8(r.take(len)?)?)
            }
            tag::INTEGER => Constant::Integer(r.u32()? as i32),
            tag::CLASS => Constant::Class { name: r.u16()? },
            tag::STRING => Constant::String { value: r.u16()? },
            tag::FIELDREF => Constant::Fieldref { class: r.u16()?, name_and_type: r.u16()? },
            tag::METHODREF => Constant::Methodref { class: r.u16()?, name_and_type: r.u16()? },
            tag::INTERFACE_METHODREF => {
                Constant::InterfaceMethodref { class: r.u16()?, name_and_type: r.u16()? }
            }
            tag::NAME_AND_TYPE => Constant::NameAndType { name: r.u16()?, descriptor: r.u16()? },
            other => return Err(ClassFileError::UnsupportedConstant { tag: other, index }),
        };
        entries.push(c);
    }
    ConstantPool::from_entries(entries)
}

fn skip_attributes(r: &mut Cursor<'_>) -> Result<()> {
    let n = r.u16()?;
    for _ in 0..n {
        r.u16()?;
        let len = r.u32()? as usize;
        r.take(len)?;
    }
    Ok(())
}

/// `base` : offset absolu du corps de l’attribut (pour les erreurs).
fn read_code(body: &[u8], base: usize) -> Result<Code> {
    let mut r = Cursor { data: body, pos: 0 };
    let wrap = |e: ClassFileError| match e {
        ClassFileError::Truncated(p) => ClassFileError::Truncated(base + p),
        other => other,
    };
    let max_stack = r.u16().map_err(wrap)?;
    let max_locals = r.u16().map_err(wrap)?;
    let len = r.u32().map_err(wrap)? as usize;
    let bytes = r.take(len).map_err(wrap)?.to_vec();
    let handlers = r.u16().map_err(wrap)? as usize;
    r.take(handlers * 8).map_err(wrap)?;
    skip_attributes(&mut r).map_err(wrap)?;
    Ok(Code { max_stack, max_locals, bytes })
}
