// Propriétés des primitives, appelées une à une sur une pile préparée.

use kemuri_compiler::compile;
use kemuri_core::runtime::eval::{EvalOptions, Machine};
use kemuri_core::ClassFile;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn library() -> ClassFile {
    let class = compile("".chars(), "Lib").unwrap();
    ClassFile::parse(&class.bytes).unwrap()
}

/// Pile après `names` appliqués dans l’ordre ; dernier élément = sommet.
fn apply(cf: &ClassFile, names: &[&str], mut stack: Vec<u16>) -> Vec<u16> {
    let mut m = Machine::new(cf, EvalOptions::default());
    for name in names {
        m.call_primitive(name, &mut stack).unwrap();
    }
    stack
}

#[test]
fn hello_pushes_reading_order_from_the_top() {
    let cf = library();
    let mut stack = apply(&cf, &["hello"], vec![7]);
    assert_eq!(stack.remove(0), 7);
    stack.reverse();
    assert_eq!(String::from_utf16(&stack).unwrap(), "Hello, world!");
}

#[test]
fn not_wraps_above_255() {
    let cf = library();
    assert_eq!(apply(&cf, &["not"], vec![0]), vec![255]);
    assert_eq!(apply(&cf, &["not"], vec![300]), vec![0xFFD3]);
    assert_eq!(apply(&cf, &["not", "not"], vec![300]), vec![300]);
    assert_eq!(apply(&cf, &["not"], vec![0xFFFF]), vec![256]);
}

#[test]
fn print_drains_and_returns() {
    let cf = library();
    let mut m = Machine::new(&cf, EvalOptions::default());
    let mut stack = vec![u16::from(b'b'), u16::from(b'a')];
    m.call_primitive("print", &mut stack).unwrap();
    assert!(stack.is_empty());
    assert_eq!(String::from_utf16_lossy(m.stdout_units()), "ab");

    let mut empty = Vec::new();
    m.call_primitive("print", &mut empty).unwrap();
    assert_eq!(m.stdout_units().len(), 2);
}

proptest! {
    #[test]
    fn dup_copies_the_top(below in any::<u16>(), top in any::<u16>()) {
        let cf = library();
        prop_assert_eq!(apply(&cf, &["dup"], vec![below, top]), vec![below, top, top]);
    }

    #[test]
    fn not_is_an_involution_on_bytes(c in 0u16..=255, below in any::<u16>()) {
        let cf = library();
        prop_assert_eq!(apply(&cf, &["not"], vec![below, c]), vec![below, 255 - c]);
        prop_assert_eq!(apply(&cf, &["not", "not"], vec![below, c]), vec![below, c]);
    }

    #[test]
    fn not_truncates_to_16_bits(c in any::<u16>()) {
        let cf = library();
        prop_assert_eq!(apply(&cf, &["not"], vec![c]), vec![255u16.wrapping_sub(c)]);
    }

    #[test]
    fn rot_cycles_in_three(a in any::<u16>(), b in any::<u16>(), c in any::<u16>(), d in any::<u16>()) {
        let cf = library();
        // bas → haut : d, Z=a, Y=b, X=c ; après rot, sommet→bas : Y, Z, X
        prop_assert_eq!(apply(&cf, &["rot"], vec![d, a, b, c]), vec![d, c, a, b]);
        prop_assert_eq!(apply(&cf, &["rot", "rot", "rot"], vec![d, a, b, c]), vec![d, a, b, c]);
    }

    #[test]
    fn xor_is_recoverable(a in any::<u16>(), b in any::<u16>()) {
        let cf = library();
        prop_assert_eq!(apply(&cf, &["xor"], vec![b, a]), vec![a ^ b]);
        // remet b sous le résultat puis re-xor : on retrouve a
        let x = apply(&cf, &["xor"], vec![b, a])[0];
        prop_assert_eq!(apply(&cf, &["xor"], vec![b, x]), vec![a]);
    }
}
