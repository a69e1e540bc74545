//! writer.rs — Assemblage d’une classe complète en mémoire.
//!
//! Une classe = pool + drapeaux + this/super + méthodes (chacune avec un
//! attribut `Code`) + attributs de classe (`SourceFile` optionnel).
//! Pas d’interfaces, pas de champs : Kemuri n’en a pas besoin.
//!
//! `to_bytes()` rend le fichier entier d’un bloc ; rien n’est écrit tant que
//! tout n’est pas valide.

use log::debug;

use super::code::{Code, CodeBuilder};
use super::constant_pool::ConstantPool;
use super::descriptor::MethodDescriptor;
use super::{access, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::{ClassFileError, Result};

#[derive(Debug)]
struct MethodInfo {
    access: u16,
    name: u16,
    descriptor: u16,
    code: Code,
}

#[derive(Debug)]
pub struct ClassBuilder {
    pool: ConstantPool,
    access: u16,
    this_class: u16,
    super_class: u16,
    internal_name: String,
    methods: Vec<MethodInfo>,
    /// Index du Utf8 "Code", réservé à la première méthode.
    code_attr: u16,
    /// (Utf8 "SourceFile", Utf8 du nom de fichier)
    source_file: Option<(u16, u16)>,
}

impl ClassBuilder {
    /// `internal_name` au format interne (`jp/example/Hello`).
    pub fn new(internal_name: &str, super_name: &str, access: u16) -> Result<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.class(internal_name)?;
        let super_class = pool.class(super_name)?;
        Ok(Self {
            pool,
            access,
            this_class,
            super_class,
            internal_name: internal_name.to_owned(),
            methods: Vec::new(),
            code_attr: 0,
            source_file: None,
        })
    }

    /// Ajoute l’attribut `SourceFile`.
    pub fn set_source_file(&mut self, name: &str) -> Result<()> {
        let attr = self.pool.utf8("SourceFile")?;
        self.source_file = Some((attr, self.pool.utf8(name)?));
        Ok(())
    }

    /// Déclare une méthode et construit son corps via `body`.
    ///
    /// Les slots des paramètres (et `this` hors `static`) sont réservés dans
    /// `max_locals` avant d’appeler `body`.
    pub fn method<F>(&mut self, access_flags: u16, name: &str, descriptor: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let md = MethodDescriptor::parse(descriptor)?;
        let this_slot = u16::from(access_flags & access::STATIC == 0);
        let mut cb = CodeBuilder::new(&mut self.pool, md.param_slots() + this_slot);
        body(&mut cb)?;
        let code = cb.finish()?;

        self.code_attr = self.pool.utf8("Code")?;
        let name = self.pool.utf8(name)?;
        let descriptor = self.pool.utf8(descriptor)?;
        if self.methods.len() >= u16::MAX as usize {
            return Err(ClassFileError::TooManyMethods(self.methods.len() + 1));
        }
        self.methods.push(MethodInfo { access: access_flags, name, descriptor, code });
        Ok(())
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Sérialise la classe complète (big-endian, JVMS §4.1).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(512);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&MINOR_VERSION.to_be_bytes());
        out.extend_from_slice(&MAJOR_VERSION.to_be_bytes());
        self.pool.write_to(&mut out);
        put_u16(&mut out, self.access);
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_u16(&mut out, 0); // interfaces
        put_u16(&mut out, 0); // fields

        put_u16(&mut out, self.methods.len() as u16);
        for m in &self.methods {
            put_u16(&mut out, m.access);
            put_u16(&mut out, m.name);
            put_u16(&mut out, m.descriptor);
            put_u16(&mut out, 1); // un seul attribut : Code
            put_u16(&mut out, self.code_attr);
            // max_stack + max_locals + code_length + code + exception_table_length + attributes_count
            let attr_len = 2 + 2 + 4 + m.code.bytes.len() + 2 + 2;
            out.extend_from_slice(&(attr_len as u32).to_be_bytes());
            put_u16(&mut out, m.code.max_stack);
            put_u16(&mut out, m.code.max_locals);
            out.extend_from_slice(&(m.code.bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&m.code.bytes);
            put_u16(&mut out, 0); // exception_table_length
            put_u16(&mut out, 0); // attributes_count
        }

        match self.source_file {
            Some((attr, idx)) => {
                put_u16(&mut out, 1);
                put_u16(&mut out, attr);
                out.extend_from_slice(&2u32.to_be_bytes());
                put_u16(&mut out, idx);
            }
            None => put_u16(&mut out, 0),
        }

        debug!(
            target: "kemuri-core",
            "classe {} : {} méthodes, {} constantes, {} octets",
            self.internal_name,
            self.methods.len(),
            self.pool.len(),
            out.len()
        );
        Ok(out)
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::opcode::Opcode;
    use pretty_assertions::assert_eq;

    fn tiny() -> ClassBuilder {
        let mut cb = ClassBuilder::new("demo/Tiny", "java/lang/Object", access::PUBLIC | access::SUPER).unwrap();
        cb.method(access::PUBLIC, "<init>", "()V", |code| {
            code.load_ref(0)?;
            code.invoke_special("java/lang/Object", "<init>", "()V")?;
            code.insn(Opcode::Return)
        })
        .unwrap();
        cb
    }

    #[test]
    fn header_and_counts() {
        let bytes = tiny().to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 0);
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 49);
        // se termine par attributes_count = 0
        assert_eq!(&bytes[bytes.len() - 2..], &[0, 0]);
    }

    #[test]
    fn instance_method_reserves_this() {
        let cb = tiny();
        assert_eq!(cb.methods[0].code.max_locals, 1);
        assert_eq!(cb.methods[0].code.max_stack, 1);
    }

    #[test]
    fn source_file_attribute_is_last() {
        let mut cb = tiny();
        cb.set_source_file("tiny.kmr").unwrap();
        let bytes = cb.to_bytes().unwrap();
        let tail = &bytes[bytes.len() - 10..];
        // count=1, name_index, length=2, sourcefile_index
        assert_eq!(&tail[..2], &[0, 1]);
        assert_eq!(&tail[4..8], &[0, 0, 0, 2]);
    }

    #[test]
    fn body_errors_propagate() {
        let mut cb = tiny();
        let err = cb
            .method(access::STATIC, "broken", "()V", |code| code.insn(Opcode::Pop))
            .unwrap_err();
        assert!(matches!(err, ClassFileError::StackUnderflow { .. }));
        assert_eq!(cb.method_count(), 1);
    }
}
