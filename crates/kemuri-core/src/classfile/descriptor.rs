//! Descripteurs JVM (`I`, `Ljava/util/Deque;`, `([Ljava/lang/String;)V`…).
//!
//! Sert surtout à la comptabilité de pile : combien de slots un appel
//! consomme et combien il en rend.

use std::fmt;

use crate::{ClassFileError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Nom interne (`java/lang/Object`).
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse un descripteur de champ complet.
    pub fn parse(desc: &str) -> Result<FieldType> {
        let (ty, rest) = Self::parse_prefix(desc)?;
        if !rest.is_empty() {
            return Err(ClassFileError::BadDescriptor(desc.to_owned()));
        }
        Ok(ty)
    }

    /// Parse un type en tête de `s` et renvoie le reste.
    fn parse_prefix(s: &str) -> Result<(FieldType, &str)> {
        let bad = || ClassFileError::BadDescriptor(s.to_owned());
        let mut chars = s.chars();
        let head = chars.next().ok_or_else(bad)?;
        let rest = chars.as_str();
        let ty = match head {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let end = rest.find(';').ok_or_else(bad)?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(bad());
                }
                return Ok((FieldType::Object(name.to_owned()), &rest[end + 1..]));
            }
            '[' => {
                let (inner, rest) = Self::parse_prefix(rest)?;
                return Ok((FieldType::Array(Box::new(inner)), rest));
            }
            _ => return Err(bad()),
        };
        Ok((ty, rest))
    }

    /// Slots occupés sur la pile ou dans les locals.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }
}

/// Rendu "Java" : `char`, `java.util.Deque`, `java.lang.String[]`.
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("byte"),
            FieldType::Char => f.write_str("char"),
            FieldType::Double => f.write_str("double"),
            FieldType::Float => f.write_str("float"),
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::Short => f.write_str("short"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Object(name) => f.write_str(&name.replace('/', ".")),
            FieldType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` pour `V`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<MethodDescriptor> {
        let bad = || ClassFileError::BadDescriptor(desc.to_owned());
        let mut rest = desc.strip_prefix('(').ok_or_else(bad)?;
        let mut params = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (ty, after) = FieldType::parse_prefix(rest).map_err(|_| bad())?;
            params.push(ty);
            rest = after;
        }
        let ret = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest).map_err(|_| bad())?)
        };
        Ok(MethodDescriptor { params, ret })
    }

    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_kemuri_signatures() {
        let d = MethodDescriptor::parse("(Ljava/util/Deque;)V").unwrap();
        assert_eq!(d.params, vec![FieldType::Object("java/util/Deque".into())]);
        assert_eq!(d.ret, None);
        assert_eq!(d.param_slots(), 1);
        assert_eq!(d.return_slots(), 0);

        let main = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(main.params[0].to_string(), "java.lang.String[]");

        let value_of = MethodDescriptor::parse("(C)Ljava/lang/Character;").unwrap();
        assert_eq!(value_of.params, vec![FieldType::Char]);
        assert_eq!(value_of.return_slots(), 1);
    }

    #[test]
    fn wide_types_take_two_slots() {
        let d = MethodDescriptor::parse("(JID)J").unwrap();
        assert_eq!(d.param_slots(), 5);
        assert_eq!(d.return_slots(), 2);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "V", "(", "(Ljava/lang/Object)V", "(L;)V", "()", "()VV", "(Q)V"] {
            assert!(MethodDescriptor::parse(bad).is_err(), "{bad:?}");
        }
        assert!(FieldType::parse("II").is_err());
    }
}
