//! Tests for the mangled-name grammar
//!
//! Mangled names are lookup keys shared between independently built modules,
//! so the exact strings matter as much as the round trip.

use cinterop_abi::{demangle, demangle_list, mangle_list, BuiltinKind, Mangle, SymbolName, Type, TypeArgument};

fn no_structs(_: &SymbolName) -> Option<Vec<Type>> {
    None
}

fn reference(full: &str) -> Type {
    Type::reference(SymbolName::from_full_name(full))
}

/// A sample of types reachable through the grammar without ambiguous nesting
fn sample_types() -> Vec<Type> {
    let list = reference("util.List");
    let map = reference("util.Map");
    vec![
        Type::VOID,
        Type::array(Type::DOUBLE, 7),
        Type::array(Type::array(Type::BYTE, 1), 4),
        reference("Top"),
        reference("org.example.deep.Name"),
        Type::cone(list.clone(), vec![TypeArgument::Star]),
        Type::cone(
            map.clone(),
            vec![
                Type::INT.into(),
                Type::cone(list.clone(), vec![Type::array(Type::CHAR, 2).into()]).into(),
            ],
        ),
        Type::array(Type::cone(list, vec![Type::BOOL.into()]), 3),
        Type::cone(Type::cone(map, vec![TypeArgument::Star]), vec![Type::POINTER.into()]),
    ]
}

#[test]
fn test_demangle_inverts_mangle() {
    for ty in sample_types() {
        let mangled = ty.mangled_name();
        let back = demangle(&mangled, &no_structs).unwrap_or_else(|e| panic!("{}: {}", mangled, e));
        assert_eq!(back, ty, "mangled form {}", mangled);
    }
}

#[test]
fn test_list_round_trip() {
    let types = sample_types();
    let mangled = mangle_list(&types);
    assert_eq!(demangle_list(&mangled, &no_structs).unwrap(), types);
}

#[test]
fn test_mangling_is_structural() {
    let a = Type::cone(reference("util.List"), vec![Type::INT.into()]);
    let b = Type::cone(reference("util.List"), vec![Type::INT.into()]);
    assert_eq!(a.mangled_name(), b.mangled_name());
    assert_eq!(a.mangled_name(), "C$util_List$CT$d$T");
}

#[test]
fn test_every_builtin_has_a_distinct_letter() {
    let letters: String = BuiltinKind::ALL.iter().map(|kind| kind.mangled_name()).collect();
    assert_eq!(letters, "abcdefghijklmnopq");
}

#[test]
fn test_nested_struct_resolution() {
    let point = SymbolName::from_full_name("geo.Point");
    let line = SymbolName::from_full_name("geo.Line");
    let point_ty = Type::struct_of(point.clone(), vec![Type::FLOAT, Type::FLOAT]);
    let line_ty = Type::struct_of(line.clone(), vec![point_ty.clone(), point_ty.clone()]);

    let resolver = |name: &SymbolName| {
        if name == &point {
            Some(vec![Type::FLOAT, Type::FLOAT])
        } else if name == &line {
            Some(vec![point_ty.clone(), point_ty.clone()])
        } else {
            None
        }
    };

    let generic = Type::cone(line_ty.clone(), vec![TypeArgument::Star]);
    assert_eq!(demangle(&generic.mangled_name(), &resolver).unwrap(), generic);
    assert_eq!(line_ty.flatten().len(), 4);
}

#[test]
fn test_ambiguous_nested_arrays_favor_the_outer_level() {
    // Array(Array(int, 2), 1) and Array(Array(int, 1), 2) share a mangled form
    let inner_heavy = Type::array(Type::array(Type::INT, 2), 1);
    let outer_heavy = Type::array(Type::array(Type::INT, 1), 2);
    assert_eq!(inner_heavy.mangled_name(), outer_heavy.mangled_name());
    assert_eq!(demangle(&inner_heavy.mangled_name(), &no_structs).unwrap(), outer_heavy);
}
