//! Name mangling
//!
//! Mangled names are the cross-module lookup keys for types. The grammar is a
//! plain concatenation:
//!
//! ```text
//! builtin    a .. q
//! array      "A$"{dims} elem "$A"
//! reference  "C$" pkg_pkg_short "$C"
//! struct     "S$" pkg_pkg_short "$S"
//! cone       generic "T$" arg* "$T"
//! star       "_"
//! ```
//!
//! Struct fields are not part of the mangled form, so demangling takes a
//! resolver that supplies them by name.
//!
//! Directly nested arrays are ambiguous: the opening markers of all levels
//! run together and only the innermost closing markers are distinguishable.
//! The demangler assigns one element to every inner level and gives the
//! remaining count to the outermost one, so `Array(Array(T, 1), n)` round-trips
//! but `Array(Array(T, m), n)` with `m > 1` does not.
//!
//! A generic application with no arguments (`T$$T`) leaves its type as is,
//! and no demangled type nests deeper than [`MAX_NESTING`] levels.

use crate::codec::MAX_NESTING;
use crate::error::{DemangleError, DemangleResult};
use crate::name::SymbolName;
use crate::symbol::FunctionSignature;
use crate::types::{BuiltinKind, Type, TypeArgument};

/// Values with a mangled form
pub trait Mangle {
    fn mangle_into(&self, out: &mut String);

    fn mangled_name(&self) -> String {
        let mut out = String::new();
        self.mangle_into(&mut out);
        out
    }
}

impl Mangle for BuiltinKind {
    fn mangle_into(&self, out: &mut String) {
        out.push(self.mangled_code());
    }
}

impl Mangle for Type {
    fn mangle_into(&self, out: &mut String) {
        match self {
            Type::Builtin(kind) => kind.mangle_into(out),
            Type::Array {
                element,
                dimensions,
            } => {
                for _ in 0..*dimensions {
                    out.push_str("A$");
                }
                element.mangle_into(out);
                out.push_str("$A");
            }
            Type::Struct { name, .. } => mangle_named(out, 'S', name),
            Type::Reference(name) => mangle_named(out, 'C', name),
            Type::Cone { generic, arguments } => {
                generic.mangle_into(out);
                if !arguments.is_empty() {
                    out.push_str("T$");
                    for argument in arguments {
                        argument.mangle_into(out);
                    }
                    out.push_str("$T");
                }
            }
        }
    }
}

impl Mangle for TypeArgument {
    fn mangle_into(&self, out: &mut String) {
        match self {
            TypeArgument::Star => out.push('_'),
            TypeArgument::Concrete(ty) => ty.mangle_into(out),
        }
    }
}

impl Mangle for [Type] {
    fn mangle_into(&self, out: &mut String) {
        for ty in self {
            ty.mangle_into(out);
        }
    }
}

fn mangle_named(out: &mut String, marker: char, name: &SymbolName) {
    out.push(marker);
    out.push('$');
    out.push_str(&name.mangled());
    out.push('$');
    out.push(marker);
}

/// Concatenated mangled forms of `types`
pub fn mangle_list(types: &[Type]) -> String {
    types.mangled_name()
}

/// Lookup key of a function signature
///
/// ```text
/// F$ name $R ret $P params $D dispatch $E extension $X contexts $G type-args $F
/// ```
///
/// Absent receivers leave their section empty. The key is never demangled.
pub fn mangle_signature(name: &SymbolName, signature: &FunctionSignature, type_arguments: &[Type]) -> String {
    let mut out = String::from("F$");
    out.push_str(&name.mangled());
    out.push_str("$R");
    signature.return_type.mangle_into(&mut out);
    out.push_str("$P");
    signature.parameters.mangle_into(&mut out);
    out.push_str("$D");
    if let Some(receiver) = &signature.dispatch_receiver {
        receiver.mangle_into(&mut out);
    }
    out.push_str("$E");
    if let Some(receiver) = &signature.extension_receiver {
        receiver.mangle_into(&mut out);
    }
    out.push_str("$X");
    signature.context_receivers.mangle_into(&mut out);
    out.push_str("$G");
    type_arguments.mangle_into(&mut out);
    out.push_str("$F");
    out
}

/// Parse a single mangled type, consuming the whole input
pub fn demangle(input: &str, resolver: &dyn Fn(&SymbolName) -> Option<Vec<Type>>) -> DemangleResult<Type> {
    let mut parser = Demangler::new(input, resolver);
    let (ty, _) = parser.parse_type()?;
    parser.finish()?;
    Ok(ty)
}

/// Parse a concatenation of mangled types; the empty string is the empty list
pub fn demangle_list(input: &str, resolver: &dyn Fn(&SymbolName) -> Option<Vec<Type>>) -> DemangleResult<Vec<Type>> {
    let mut parser = Demangler::new(input, resolver);
    let mut types = Vec::new();
    while !parser.at_end() {
        types.push(parser.parse_type()?.0);
    }
    Ok(types)
}

/// Recursive-descent parser over the mangled grammar
struct Demangler<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    resolver: &'a dyn Fn(&SymbolName) -> Option<Vec<Type>>,
}

/// A parsed type and the height of its tree
type Parsed = (Type, usize);

/// Arguments of one generic application and the height of the tallest
type Application = (Vec<TypeArgument>, usize);

impl<'a> Demangler<'a> {
    fn new(input: &'a str, resolver: &'a dyn Fn(&SymbolName) -> Option<Vec<Type>>) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            resolver,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn looking_at(&self, token: &str) -> bool {
        self.rest().starts_with(token)
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.looking_at(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> DemangleResult<()> {
        if self.eat(token) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn unexpected(&self) -> DemangleError {
        match self.peek() {
            Some(found) => DemangleError::UnexpectedChar {
                input: self.input.to_string(),
                offset: self.pos,
                found,
            },
            None => DemangleError::UnexpectedEnd {
                input: self.input.to_string(),
            },
        }
    }

    fn finish(&self) -> DemangleResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(DemangleError::TrailingInput {
                input: self.input.to_string(),
                offset: self.pos,
            })
        }
    }

    fn too_deep(&self) -> DemangleError {
        DemangleError::NestingTooDeep {
            input: self.input.to_string(),
            offset: self.pos,
        }
    }

    /// Height of a node wrapping a child of the given height
    fn nest(&self, child: usize) -> DemangleResult<usize> {
        let height = child + 1;
        if height > MAX_NESTING {
            return Err(self.too_deep());
        }
        Ok(height)
    }

    /// A base type followed by any number of generic applications
    fn parse_type(&mut self) -> DemangleResult<Parsed> {
        if self.depth >= MAX_NESTING {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let parsed = self.parse_base().and_then(|base| {
            let applications = self.parse_applications()?;
            self.apply(base, applications)
        });
        self.depth -= 1;
        parsed
    }

    /// Zero or more `T$ arg* $T` groups; empty groups are dropped
    fn parse_applications(&mut self) -> DemangleResult<Vec<Application>> {
        let mut applications = Vec::new();
        while self.eat("T$") {
            let mut arguments = Vec::new();
            let mut tallest = 0;
            while !self.eat("$T") {
                if self.eat("_") {
                    arguments.push(TypeArgument::Star);
                } else {
                    let (argument, height) = self.parse_type()?;
                    tallest = tallest.max(height);
                    arguments.push(TypeArgument::Concrete(argument));
                }
            }
            if !arguments.is_empty() {
                applications.push((arguments, tallest));
            }
        }
        Ok(applications)
    }

    fn apply(&self, generic: Parsed, applications: Vec<Application>) -> DemangleResult<Parsed> {
        let (mut ty, mut height) = generic;
        for (arguments, tallest) in applications {
            height = self.nest(height.max(tallest))?;
            ty = Type::Cone {
                generic: Box::new(ty),
                arguments,
            };
        }
        Ok((ty, height))
    }

    fn parse_base(&mut self) -> DemangleResult<Parsed> {
        let code = self.peek().ok_or_else(|| self.unexpected())?;
        match code {
            'A' => self.parse_array(),
            'C' => {
                let name = self.parse_name('C')?;
                Ok((Type::Reference(name), 1))
            }
            'S' => {
                let name = self.parse_name('S')?;
                let fields =
                    (self.resolver)(&name).ok_or_else(|| DemangleError::UnresolvedStruct(name.full_name().to_string()))?;
                let height = self.nest(fields.iter().map(type_height).max().unwrap_or(0))?;
                Ok((Type::Struct { name, fields }, height))
            }
            _ => match BuiltinKind::from_mangled_code(code) {
                Some(kind) => {
                    self.pos += 1;
                    Ok((Type::Builtin(kind), 1))
                }
                None => Err(self.unexpected()),
            },
        }
    }

    /// `X$name$X`, where `name` is the mangled symbol name
    fn parse_name(&mut self, marker: char) -> DemangleResult<SymbolName> {
        let mut open = String::with_capacity(2);
        open.push(marker);
        open.push('$');
        self.expect(&open)?;

        let len = self.rest().find('$').ok_or_else(|| DemangleError::UnexpectedEnd {
            input: self.input.to_string(),
        })?;
        let mangled = &self.rest()[..len];
        self.pos += len;

        let mut close = String::with_capacity(2);
        close.push('$');
        close.push(marker);
        self.expect(&close)?;

        Ok(SymbolName::from_mangled(mangled)?)
    }

    fn parse_array(&mut self) -> DemangleResult<Parsed> {
        let mut opens = 0u32;
        while self.eat("A$") {
            opens += 1;
        }
        if opens == 0 {
            return Err(self.unexpected());
        }

        let element = self.parse_type()?;

        // Each closing marker ends one level; generic applications written
        // after a closing marker belong to that level.
        let mut levels: Vec<Vec<Application>> = Vec::new();
        while (levels.len() as u32) < opens && self.eat("$A") {
            levels.push(self.parse_applications()?);
        }
        if levels.is_empty() {
            return Err(self.unexpected());
        }

        let outer_dimensions = opens - (levels.len() as u32 - 1);
        let last = levels.len() - 1;
        let (mut ty, mut height) = element;
        for (i, applications) in levels.into_iter().enumerate() {
            let dimensions = if i == last { outer_dimensions } else { 1 };
            height = self.nest(height)?;
            ty = Type::Array {
                element: Box::new(ty),
                dimensions,
            };
            (ty, height) = self.apply((ty, height), applications)?;
        }
        Ok((ty, height))
    }
}

/// Height of a type tree; a builtin is one level
fn type_height(ty: &Type) -> usize {
    match ty {
        Type::Builtin(_) | Type::Reference(_) => 1,
        Type::Array { element, .. } => 1 + type_height(element),
        Type::Struct { fields, .. } => 1 + fields.iter().map(type_height).max().unwrap_or(0),
        Type::Cone { generic, arguments } => {
            let tallest = arguments
                .iter()
                .filter_map(|argument| match argument {
                    TypeArgument::Concrete(ty) => Some(type_height(ty)),
                    TypeArgument::Star => None,
                })
                .max()
                .unwrap_or(0);
            1 + type_height(generic).max(tallest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_structs(_: &SymbolName) -> Option<Vec<Type>> {
        None
    }

    #[test]
    fn test_literal_vectors() {
        let woof = SymbolName::new("dog.Woof", "Woof").unwrap();
        let ahhh = SymbolName::new("fox.Ahhh", "Ahhh").unwrap();

        assert_eq!(Type::array(Type::INT, 2).mangled_name(), "A$A$d$A");
        assert_eq!(Type::array(Type::INT, 1).mangled_name(), "A$d$A");
        assert_eq!(Type::reference(woof).mangled_name(), "C$dog_Woof$C");
        assert_eq!(Type::struct_of(ahhh, vec![Type::INT]).mangled_name(), "S$fox_Ahhh$S");
        assert_eq!(
            mangle_list(&[Type::INT, Type::LONG, Type::array(Type::INT, 1)]),
            "deA$d$A"
        );
        assert_eq!(mangle_list(&[]), "");
    }

    #[test]
    fn test_cone_mangling() {
        let list = Type::reference(SymbolName::from_full_name("util.List"));
        let applied = Type::cone(list.clone(), vec![TypeArgument::Star, Type::BOOL.into()]);
        assert_eq!(applied.mangled_name(), "C$util_List$CT$_o$T");
        assert_eq!(Type::cone(list.clone(), vec![]).mangled_name(), list.mangled_name());
    }

    #[test]
    fn test_demangle_builtins() {
        for kind in BuiltinKind::ALL {
            let code = kind.mangled_code().to_string();
            assert_eq!(demangle(&code, &no_structs).unwrap(), Type::Builtin(kind));
        }
    }

    #[test]
    fn test_demangle_array_dimensions() {
        assert_eq!(demangle("A$A$d$A", &no_structs).unwrap(), Type::array(Type::INT, 2));
        // Array of a single-element array
        let nested = Type::array(Type::array(Type::INT, 1), 3);
        assert_eq!(demangle(&nested.mangled_name(), &no_structs).unwrap(), nested);
    }

    #[test]
    fn test_demangle_generic_array_level() {
        let list = SymbolName::from_full_name("util.List");
        let inner = Type::cone(Type::array(Type::LONG, 1), vec![Type::reference(list).into()]);
        let outer = Type::array(inner, 2);
        assert_eq!(demangle(&outer.mangled_name(), &no_structs).unwrap(), outer);
    }

    #[test]
    fn test_demangle_struct_uses_resolver() {
        let point = SymbolName::from_full_name("geo.Point");
        let ty = Type::struct_of(point.clone(), vec![Type::DOUBLE, Type::DOUBLE]);
        let resolver = |name: &SymbolName| (name == &point).then(|| vec![Type::DOUBLE, Type::DOUBLE]);
        assert_eq!(demangle(&ty.mangled_name(), &resolver).unwrap(), ty);

        assert_eq!(
            demangle("S$geo_Point$S", &no_structs),
            Err(DemangleError::UnresolvedStruct("geo.Point".to_string()))
        );
    }

    #[test]
    fn test_demangle_errors() {
        assert!(matches!(demangle("", &no_structs), Err(DemangleError::UnexpectedEnd { .. })));
        assert!(matches!(
            demangle("dd", &no_structs),
            Err(DemangleError::TrailingInput { offset: 1, .. })
        ));
        assert!(matches!(
            demangle("A$d", &no_structs),
            Err(DemangleError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            demangle("Z", &no_structs),
            Err(DemangleError::UnexpectedChar { found: 'Z', offset: 0, .. })
        ));
        assert!(matches!(
            demangle("C$dog_Woof", &no_structs),
            Err(DemangleError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_demangle_empty_application() {
        assert_eq!(demangle("dT$$T", &no_structs).unwrap(), Type::INT);
        let list = Type::reference(SymbolName::from_full_name("util.List"));
        let applied = Type::cone(list.clone(), vec![Type::INT.into()]);
        assert_eq!(demangle("C$util_List$CT$$TT$d$T", &no_structs).unwrap(), applied);
        assert_eq!(demangle("A$d$AT$$T", &no_structs).unwrap(), Type::array(Type::INT, 1));
    }

    #[test]
    fn test_demangle_rejects_deep_nesting() {
        let generics = "dT$".repeat(100_000);
        assert!(matches!(
            demangle(&generics, &no_structs),
            Err(DemangleError::NestingTooDeep { .. })
        ));

        let arrays = format!("{}d{}", "A$".repeat(100_000), "$A".repeat(100_000));
        assert!(matches!(
            demangle(&arrays, &no_structs),
            Err(DemangleError::NestingTooDeep { .. })
        ));

        let applications = format!("d{}", "T$d$T".repeat(100_000));
        assert!(matches!(
            demangle(&applications, &no_structs),
            Err(DemangleError::NestingTooDeep { .. })
        ));

        // A single array level with many dimensions is shallow
        let wide = format!("{}d$A", "A$".repeat(1_000));
        assert_eq!(demangle(&wide, &no_structs).unwrap(), Type::array(Type::INT, 1_000));

        let nested = (0..MAX_NESTING - 1).fold(Type::INT, |ty, _| Type::array(ty, 1));
        assert_eq!(demangle(&nested.mangled_name(), &no_structs).unwrap(), nested);
    }

    #[test]
    fn test_demangle_list() {
        let types = vec![Type::INT, Type::LONG, Type::array(Type::INT, 1)];
        assert_eq!(demangle_list("deA$d$A", &no_structs).unwrap(), types);
        assert!(demangle_list("", &no_structs).unwrap().is_empty());
    }

    #[test]
    fn test_signature_key() {
        let name = SymbolName::from_full_name("math.add");
        let signature = FunctionSignature::new(Type::INT, vec![Type::INT, Type::INT]);
        assert_eq!(mangle_signature(&name, &signature, &[]), "F$math_add$Rd$Pdd$D$E$X$G$F");

        let receiver = Type::reference(SymbolName::from_full_name("math.Vec"));
        let method = signature.with_dispatch_receiver(receiver);
        assert_eq!(
            mangle_signature(&name, &method, &[Type::FLOAT]),
            "F$math_add$Rd$Pdd$DC$math_Vec$C$E$X$Gl$F"
        );
    }
}
