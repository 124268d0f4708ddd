//! Symbols and symbol tables
//!
//! A [`SymbolTable`] is the public surface of one compiled unit. Tables are
//! immutable; linking units together concatenates them with `+`.

use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::codec::{ByteReader, ByteWriter, Decode, Encode};
use crate::error::DecodeError;
use crate::mangle::mangle_signature;
use crate::name::SymbolName;
use crate::types::Type;

const FUNCTION_TAG: u8 = 0;
const CLASS_TAG: u8 = 1;
const STRUCT_TAG: u8 = 2;

static NEXT_SYMBOL_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique symbol identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        SymbolId(NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an identifier read from elsewhere
    ///
    /// Identifiers allocated afterwards by [`next`](Self::next) are greater
    /// than `raw`.
    pub fn from_raw(raw: u32) -> Self {
        NEXT_SYMBOL_ID.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
        SymbolId(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    pub name: SymbolName,
    pub line: i32,
    pub column: i32,
    pub file: String,
}

impl SymbolInfo {
    pub fn new(name: SymbolName, line: i32, column: i32, file: impl Into<String>) -> Self {
        Self {
            name,
            line,
            column,
            file: file.into(),
        }
    }

    /// `file:line:column`
    pub fn to_trace_string(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

impl Encode for SymbolInfo {
    fn encode(&self, writer: &mut ByteWriter) {
        self.name.encode(writer);
        writer.write_i32(self.line);
        writer.write_i32(self.column);
        writer.write_str(&self.file);
    }
}

impl Decode for SymbolInfo {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: SymbolName::decode(reader)?,
            line: reader.read_i32()?,
            column: reader.read_i32()?,
            file: reader.read_string()?,
        })
    }
}

/// Return and parameter shape of a function symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub return_type: Type,
    pub parameters: Vec<Type>,
    pub dispatch_receiver: Option<Type>,
    pub extension_receiver: Option<Type>,
    pub context_receivers: Vec<Type>,
}

impl FunctionSignature {
    pub fn new(return_type: Type, parameters: Vec<Type>) -> Self {
        Self {
            return_type,
            parameters,
            dispatch_receiver: None,
            extension_receiver: None,
            context_receivers: Vec::new(),
        }
    }

    pub fn with_dispatch_receiver(mut self, receiver: Type) -> Self {
        self.dispatch_receiver = Some(receiver);
        self
    }

    pub fn with_extension_receiver(mut self, receiver: Type) -> Self {
        self.extension_receiver = Some(receiver);
        self
    }

    pub fn with_context_receivers(mut self, receivers: Vec<Type>) -> Self {
        self.context_receivers = receivers;
        self
    }

    /// Every value the native entry point receives, in call order:
    /// dispatch receiver, context receivers, extension receiver, parameters
    pub fn native_parameters(&self) -> Vec<&Type> {
        self.dispatch_receiver
            .iter()
            .chain(&self.context_receivers)
            .chain(&self.extension_receiver)
            .chain(&self.parameters)
            .collect()
    }
}

impl Encode for FunctionSignature {
    fn encode(&self, writer: &mut ByteWriter) {
        self.return_type.encode(writer);
        self.parameters.encode(writer);
        self.dispatch_receiver.encode(writer);
        self.extension_receiver.encode(writer);
        self.context_receivers.encode(writer);
    }
}

impl Decode for FunctionSignature {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            return_type: Type::decode(reader)?,
            parameters: Vec::decode(reader)?,
            dispatch_receiver: Option::decode(reader)?,
            extension_receiver: Option::decode(reader)?,
            context_receivers: Vec::decode(reader)?,
        })
    }
}

/// Variant-specific part of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function(FunctionSignature),
    Class,
    Struct { fields: Vec<Type> },
}

impl SymbolKind {
    fn tag(&self) -> u8 {
        match self {
            SymbolKind::Function(_) => FUNCTION_TAG,
            SymbolKind::Class => CLASS_TAG,
            SymbolKind::Struct { .. } => STRUCT_TAG,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function(_) => "function",
            SymbolKind::Class => "class",
            SymbolKind::Struct { .. } => "struct",
        }
    }
}

/// A named entity exported by a compiled unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    id: SymbolId,
    info: SymbolInfo,
    original_info: Option<SymbolInfo>,
    type_arguments: Vec<Type>,
    kind: SymbolKind,
}

impl Symbol {
    /// Create a symbol with a freshly allocated id
    pub fn new(info: SymbolInfo, kind: SymbolKind) -> Self {
        Self {
            id: SymbolId::next(),
            info,
            original_info: None,
            type_arguments: Vec::new(),
            kind,
        }
    }

    pub fn function(info: SymbolInfo, signature: FunctionSignature) -> Self {
        Self::new(info, SymbolKind::Function(signature))
    }

    pub fn class(info: SymbolInfo) -> Self {
        Self::new(info, SymbolKind::Class)
    }

    pub fn structure(info: SymbolInfo, fields: Vec<Type>) -> Self {
        Self::new(info, SymbolKind::Struct { fields })
    }

    /// Record the symbol this one was specialized from
    pub fn with_original_info(mut self, original: SymbolInfo) -> Self {
        self.original_info = Some(original);
        self
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<Type>) -> Self {
        self.type_arguments = type_arguments;
        self
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn info(&self) -> &SymbolInfo {
        &self.info
    }

    pub fn name(&self) -> &SymbolName {
        &self.info.name
    }

    pub fn original_info(&self) -> Option<&SymbolInfo> {
        self.original_info.as_ref()
    }

    pub fn type_arguments(&self) -> &[Type] {
        &self.type_arguments
    }

    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    pub fn signature(&self) -> Option<&FunctionSignature> {
        match &self.kind {
            SymbolKind::Function(signature) => Some(signature),
            _ => None,
        }
    }

    /// Lookup key of a function symbol
    pub fn mangled_signature(&self) -> Option<String> {
        self.signature()
            .map(|signature| mangle_signature(&self.info.name, signature, &self.type_arguments))
    }

    /// Struct type described by a struct symbol
    pub fn as_type(&self) -> Option<Type> {
        match &self.kind {
            SymbolKind::Struct { fields } => Some(Type::struct_of(self.info.name.clone(), fields.clone())),
            _ => None,
        }
    }

    fn decode_variant(
        reader: &mut ByteReader<'_>,
        what: &'static str,
        tag: u8,
    ) -> Result<Self, DecodeError> {
        reader.expect_tag(what, tag)?;
        let id = SymbolId::from_raw(reader.read_u32()?);
        let info = SymbolInfo::decode(reader)?;
        let original_info = Option::<SymbolInfo>::decode(reader)?;
        let type_arguments = Vec::<Type>::decode(reader)?;
        let kind = match tag {
            FUNCTION_TAG => SymbolKind::Function(FunctionSignature::decode(reader)?),
            CLASS_TAG => SymbolKind::Class,
            _ => SymbolKind::Struct {
                fields: Vec::decode(reader)?,
            },
        };
        Ok(Self {
            id,
            info,
            original_info,
            type_arguments,
            kind,
        })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.info.name)?;
        if !self.type_arguments.is_empty() {
            f.write_str("<")?;
            for (i, argument) in self.type_arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", argument)?;
            }
            f.write_str(">")?;
        }
        match &self.kind {
            SymbolKind::Function(signature) => {
                f.write_str("(")?;
                for (i, parameter) in signature.parameters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", parameter)?;
                }
                write!(f, ") -> {}", signature.return_type)
            }
            SymbolKind::Class => Ok(()),
            SymbolKind::Struct { fields } => {
                f.write_str(" {")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Encode for Symbol {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.kind.tag());
        writer.write_u32(self.id.0);
        self.info.encode(writer);
        self.original_info.encode(writer);
        self.type_arguments.encode(writer);
        match &self.kind {
            SymbolKind::Function(signature) => signature.encode(writer),
            SymbolKind::Class => {}
            SymbolKind::Struct { fields } => fields.encode(writer),
        }
    }
}

impl Decode for Symbol {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        match reader.peek_u8()? {
            FUNCTION_TAG => Self::decode_variant(reader, "function symbol", FUNCTION_TAG),
            CLASS_TAG => Self::decode_variant(reader, "class symbol", CLASS_TAG),
            STRUCT_TAG => Self::decode_variant(reader, "struct symbol", STRUCT_TAG),
            tag => Err(DecodeError::UnknownTag {
                what: "symbol",
                offset: reader.position(),
                tag,
            }),
        }
    }
}

/// Ordered, immutable collection of symbols
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Symbol at `index` in table order
    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn find_by_id(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.iter().find(|symbol| symbol.id == id)
    }

    /// First symbol with the given full name
    pub fn find_by_name(&self, full_name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|symbol| symbol.info.name.full_name() == full_name)
    }

    /// Function symbol whose signature mangles to `key`
    pub fn find_by_signature(&self, key: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|symbol| symbol.mangled_signature().as_deref() == Some(key))
    }

    /// Field layout of the struct symbol called `name`
    ///
    /// Has the shape of the resolver taken by [`demangle`](crate::demangle).
    pub fn struct_fields(&self, name: &SymbolName) -> Option<Vec<Type>> {
        self.symbols.iter().find_map(|symbol| match &symbol.kind {
            SymbolKind::Struct { fields } if &symbol.info.name == name => Some(fields.clone()),
            _ => None,
        })
    }
}

impl Add for SymbolTable {
    type Output = SymbolTable;

    fn add(mut self, rhs: SymbolTable) -> SymbolTable {
        self.symbols.extend(rhs.symbols);
        self
    }
}

impl<'a> Add<&'a SymbolTable> for &'a SymbolTable {
    type Output = SymbolTable;

    fn add(self, rhs: &'a SymbolTable) -> SymbolTable {
        let mut symbols = Vec::with_capacity(self.len() + rhs.len());
        symbols.extend_from_slice(&self.symbols);
        symbols.extend_from_slice(&rhs.symbols);
        SymbolTable { symbols }
    }
}

impl FromIterator<Symbol> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SymbolTable {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

impl IntoIterator for SymbolTable {
    type Item = Symbol;
    type IntoIter = std::vec::IntoIter<Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.into_iter()
    }
}

impl Encode for SymbolTable {
    fn encode(&self, writer: &mut ByteWriter) {
        self.symbols.encode(writer);
    }
}

impl Decode for SymbolTable {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            symbols: Vec::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(full: &str, line: i32) -> SymbolInfo {
        SymbolInfo::new(SymbolName::from_full_name(full), line, 4, "src/lib.kt")
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Symbol::class(info("a.A", 1));
        let b = Symbol::class(info("a.A", 1));
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_decoded_ids_are_not_reissued() {
        let remote = Symbol::class(info("b.B", 2));
        let raw = remote.id().as_u32() + 1_000;
        let mut bytes = remote.to_bytes();
        bytes[1..5].copy_from_slice(&raw.to_be_bytes());
        let decoded = Symbol::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.id().as_u32(), raw);

        let local = Symbol::class(info("a.A", 1));
        assert!(local.id().as_u32() > raw);

        let linked = SymbolTable::new(vec![decoded.clone()]) + SymbolTable::new(vec![local.clone()]);
        assert_eq!(linked.find_by_id(local.id()), Some(&local));
        assert_eq!(linked.find_by_id(decoded.id()), Some(&decoded));
    }

    #[test]
    fn test_trace_string() {
        assert_eq!(info("a.b.C", 12).to_trace_string(), "src/lib.kt:12:4");
    }

    #[test]
    fn test_native_parameter_order() {
        let signature = FunctionSignature::new(Type::VOID, vec![Type::INT])
            .with_dispatch_receiver(Type::POINTER)
            .with_extension_receiver(Type::LONG)
            .with_context_receivers(vec![Type::BOOL]);
        assert_eq!(
            signature.native_parameters(),
            vec![&Type::POINTER, &Type::BOOL, &Type::LONG, &Type::INT]
        );
    }

    #[test]
    fn test_struct_symbol_as_type() {
        let symbol = Symbol::structure(info("geo.Point", 3), vec![Type::INT, Type::INT]);
        let ty = symbol.as_type().unwrap();
        assert_eq!(ty.size(), 8);
        assert_eq!(ty.symbol_name().unwrap().full_name(), "geo.Point");
        assert!(Symbol::class(info("geo.Shape", 1)).as_type().is_none());
    }

    #[test]
    fn test_symbol_header_layout() {
        let symbol = Symbol::class(info("A", 1));
        let bytes = symbol.to_bytes();
        assert_eq!(bytes[0], CLASS_TAG);
        assert_eq!(&bytes[1..5], &symbol.id().as_u32().to_be_bytes());
    }

    #[test]
    fn test_unknown_symbol_tag() {
        assert!(matches!(
            Symbol::from_bytes(&[7]),
            Err(DecodeError::UnknownTag { what: "symbol", tag: 7, .. })
        ));
    }

    #[test]
    fn test_lookup() {
        let point = Symbol::structure(info("geo.Point", 3), vec![Type::INT]);
        let area = Symbol::function(info("geo.area", 9), FunctionSignature::new(Type::DOUBLE, vec![]));
        let key = area.mangled_signature().unwrap();
        let table = SymbolTable::new(vec![point.clone(), area.clone()]);

        assert_eq!(table.get(1), Some(&area));
        assert_eq!(table.find_by_id(point.id()), Some(&point));
        assert_eq!(table.find_by_name("geo.area"), Some(&area));
        assert_eq!(table.find_by_signature(&key), Some(&area));
        assert_eq!(
            table.struct_fields(&SymbolName::from_full_name("geo.Point")),
            Some(vec![Type::INT])
        );
        assert_eq!(table.struct_fields(&SymbolName::from_full_name("geo.area")), None);
    }
}
