// Écriture sur disque : `compile_to` et ses préconditions.

use std::fs;

use kemuri_compiler::{compile_to, CompileError, Compiler};
use kemuri_core::ClassFile;
use pretty_assertions::assert_eq;

#[test]
fn writes_full_name_dot_class() {
    let dir = tempfile::tempdir().unwrap();
    let path = compile_to("`|".chars(), "jp.example.Hello", dir.path()).unwrap();
    assert_eq!(path, dir.path().join("jp.example.Hello.class"));

    let bytes = fs::read(&path).unwrap();
    let cf = ClassFile::parse(&bytes).unwrap();
    assert_eq!(cf.name().unwrap(), "jp/example/Hello");
}

#[test]
fn written_bytes_match_in_memory_compile() {
    let dir = tempfile::tempdir().unwrap();
    let c = Compiler::default();
    let (path, compiled) = c.compile_to("a\"|".chars(), "Same", dir.path()).unwrap();
    assert_eq!(fs::read(path).unwrap(), compiled.bytes);
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(c.compile_str("a\"|", "Same").unwrap().bytes, compiled.bytes);
}

#[test]
fn target_must_be_an_existing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    for target in [file.clone(), dir.path().join("absent")] {
        let err = compile_to("|".chars(), "A", &target).unwrap_err();
        assert!(matches!(err, CompileError::NotADirectory(ref p) if *p == target), "{err}");
    }
    // rien n’a été écrit
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn invalid_name_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let err = compile_to("|".chars(), "", dir.path()).unwrap_err();
    assert!(matches!(err, CompileError::InvalidClassName { .. }));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
