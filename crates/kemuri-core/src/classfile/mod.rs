//! Format class-file JVM : le strict nécessaire pour émettre et relire les
//! classes Kemuri.
//!
//! - [`constant_pool`] : pool dé-dupliqué + utf8 modifié
//! - [`opcode`]        : sous-ensemble d’opcodes, décodage
//! - [`descriptor`]    : descripteurs de champs/méthodes
//! - [`code`]          : `CodeBuilder` (labels, max_stack, max_locals)
//! - [`writer`]        : `ClassBuilder` → octets
//! - [`reader`]        : octets → `ClassFile`

pub mod code;
pub mod constant_pool;
pub mod descriptor;
pub mod opcode;
pub mod reader;
pub mod writer;

/// Magic de tout fichier `.class`.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Version mineure émise.
pub const MINOR_VERSION: u16 = 0;

/// Version majeure émise : 49 (Java 5). Pas de StackMapTable exigée, la
/// vérification par inférence de types suffit pour la boucle de `print`.
pub const MAJOR_VERSION: u16 = 49;

/// Drapeaux d’accès (classes et méthodes).
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    /// Pour les classes ; même bit que `SYNCHRONIZED` côté méthodes.
    pub const SUPER: u16 = 0x0020;

    /// Rendu `javap`-like des drapeaux de méthode.
    pub fn method_flags_to_string(flags: u16) -> String {
        let mut parts = Vec::new();
        if flags & PUBLIC != 0 {
            parts.push("public");
        }
        if flags & PRIVATE != 0 {
            parts.push("private");
        }
        if flags & STATIC != 0 {
            parts.push("static");
        }
        if flags & FINAL != 0 {
            parts.push("final");
        }
        parts.join(" ")
    }
}
