//! Native type model
//!
//! A [`Type`] describes the layout of a value crossing the C ABI. Sizes and
//! alignments are derived from structure on demand; the model itself carries
//! no platform state apart from [`POINTER_SIZE`].

use std::fmt;

use crate::codec::{ByteReader, ByteWriter, Decode, Encode};
use crate::error::DecodeError;
use crate::name::SymbolName;

/// Size in bytes of a native pointer on the target
pub const POINTER_SIZE: usize = std::mem::size_of::<usize>();

const BUILTIN_TAG: u8 = 0;
const ARRAY_TAG: u8 = 1;
const STRUCT_TAG: u8 = 2;
const REFERENCE_TAG: u8 = 3;
const CONE_TAG: u8 = 4;

/// Primitive kinds, in their stable ordinal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BuiltinKind {
    Void = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    NativeInt = 5,
    UByte = 6,
    UShort = 7,
    UInt = 8,
    ULong = 9,
    NativeUInt = 10,
    Float = 11,
    Double = 12,
    NativeFloat = 13,
    Bool = 14,
    Char = 15,
    Pointer = 16,
}

impl BuiltinKind {
    /// Every kind in ordinal order
    pub const ALL: [BuiltinKind; 17] = [
        BuiltinKind::Void,
        BuiltinKind::Byte,
        BuiltinKind::Short,
        BuiltinKind::Int,
        BuiltinKind::Long,
        BuiltinKind::NativeInt,
        BuiltinKind::UByte,
        BuiltinKind::UShort,
        BuiltinKind::UInt,
        BuiltinKind::ULong,
        BuiltinKind::NativeUInt,
        BuiltinKind::Float,
        BuiltinKind::Double,
        BuiltinKind::NativeFloat,
        BuiltinKind::Bool,
        BuiltinKind::Char,
        BuiltinKind::Pointer,
    ];

    #[inline]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            BuiltinKind::Void => 0,
            BuiltinKind::Byte | BuiltinKind::UByte | BuiltinKind::Bool => 1,
            BuiltinKind::Short | BuiltinKind::UShort | BuiltinKind::Char => 2,
            BuiltinKind::Int | BuiltinKind::UInt | BuiltinKind::Float => 4,
            BuiltinKind::Long | BuiltinKind::ULong | BuiltinKind::Double => 8,
            BuiltinKind::NativeInt
            | BuiltinKind::NativeUInt
            | BuiltinKind::NativeFloat
            | BuiltinKind::Pointer => POINTER_SIZE,
        }
    }

    /// Alignment in bytes; equals the size except for `void`
    pub fn alignment(self) -> usize {
        self.size().max(1)
    }

    /// One-letter code used in mangled names (`a` for void through `q` for pointer)
    pub fn mangled_code(self) -> char {
        (b'a' + self.ordinal()) as char
    }

    pub fn from_mangled_code(code: char) -> Option<Self> {
        if code.is_ascii_lowercase() {
            Self::from_ordinal(code as u8 - b'a')
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Void => "void",
            BuiltinKind::Byte => "byte",
            BuiltinKind::Short => "short",
            BuiltinKind::Int => "int",
            BuiltinKind::Long => "long",
            BuiltinKind::NativeInt => "nint",
            BuiltinKind::UByte => "ubyte",
            BuiltinKind::UShort => "ushort",
            BuiltinKind::UInt => "uint",
            BuiltinKind::ULong => "ulong",
            BuiltinKind::NativeUInt => "nuint",
            BuiltinKind::Float => "float",
            BuiltinKind::Double => "double",
            BuiltinKind::NativeFloat => "nfloat",
            BuiltinKind::Bool => "bool",
            BuiltinKind::Char => "char",
            BuiltinKind::Pointer => "pointer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BuiltinKind::Byte
                | BuiltinKind::Short
                | BuiltinKind::Int
                | BuiltinKind::Long
                | BuiltinKind::NativeInt
                | BuiltinKind::UByte
                | BuiltinKind::UShort
                | BuiltinKind::UInt
                | BuiltinKind::ULong
                | BuiltinKind::NativeUInt
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            BuiltinKind::Float | BuiltinKind::Double | BuiltinKind::NativeFloat
        )
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a native value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(BuiltinKind),
    /// Fixed-length inline array
    Array {
        element: Box<Type>,
        dimensions: u32,
    },
    /// By-value aggregate; fields are laid out back to back
    Struct {
        name: SymbolName,
        fields: Vec<Type>,
    },
    /// Opaque handle to a managed object
    Reference(SymbolName),
    /// Generic type applied to arguments
    Cone {
        generic: Box<Type>,
        arguments: Vec<TypeArgument>,
    },
}

/// Argument of a generic application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeArgument {
    /// Wildcard
    Star,
    Concrete(Type),
}

impl Type {
    pub const VOID: Type = Type::Builtin(BuiltinKind::Void);
    pub const BYTE: Type = Type::Builtin(BuiltinKind::Byte);
    pub const SHORT: Type = Type::Builtin(BuiltinKind::Short);
    pub const INT: Type = Type::Builtin(BuiltinKind::Int);
    pub const LONG: Type = Type::Builtin(BuiltinKind::Long);
    pub const NATIVE_INT: Type = Type::Builtin(BuiltinKind::NativeInt);
    pub const UBYTE: Type = Type::Builtin(BuiltinKind::UByte);
    pub const USHORT: Type = Type::Builtin(BuiltinKind::UShort);
    pub const UINT: Type = Type::Builtin(BuiltinKind::UInt);
    pub const ULONG: Type = Type::Builtin(BuiltinKind::ULong);
    pub const NATIVE_UINT: Type = Type::Builtin(BuiltinKind::NativeUInt);
    pub const FLOAT: Type = Type::Builtin(BuiltinKind::Float);
    pub const DOUBLE: Type = Type::Builtin(BuiltinKind::Double);
    pub const NATIVE_FLOAT: Type = Type::Builtin(BuiltinKind::NativeFloat);
    pub const BOOL: Type = Type::Builtin(BuiltinKind::Bool);
    pub const CHAR: Type = Type::Builtin(BuiltinKind::Char);
    pub const POINTER: Type = Type::Builtin(BuiltinKind::Pointer);

    pub fn builtin(kind: BuiltinKind) -> Self {
        Type::Builtin(kind)
    }

    /// # Panics
    /// Panics if `dimensions` is zero.
    pub fn array(element: Type, dimensions: u32) -> Self {
        assert!(dimensions > 0, "array type needs at least one element");
        Type::Array {
            element: Box::new(element),
            dimensions,
        }
    }

    pub fn struct_of(name: SymbolName, fields: Vec<Type>) -> Self {
        Type::Struct { name, fields }
    }

    pub fn reference(name: SymbolName) -> Self {
        Type::Reference(name)
    }

    /// Apply `generic` to `arguments`; with no arguments the generic is
    /// returned unchanged
    pub fn cone(generic: Type, arguments: Vec<TypeArgument>) -> Self {
        if arguments.is_empty() {
            generic
        } else {
            Type::Cone {
                generic: Box::new(generic),
                arguments,
            }
        }
    }

    /// Size in bytes, saturating at `usize::MAX`
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    /// Size in bytes, or `None` if it overflows `usize`
    pub fn checked_size(&self) -> Option<usize> {
        match self {
            Type::Builtin(kind) => Some(kind.size()),
            Type::Array {
                element,
                dimensions,
            } => element.checked_size()?.checked_mul(*dimensions as usize),
            Type::Struct { fields, .. } => fields
                .iter()
                .try_fold(0usize, |total, field| total.checked_add(field.checked_size()?)),
            Type::Reference(_) => Some(POINTER_SIZE),
            Type::Cone { generic, .. } => generic.checked_size(),
        }
    }

    /// Alignment in bytes
    pub fn alignment(&self) -> usize {
        match self {
            Type::Builtin(kind) => kind.alignment(),
            Type::Array { element, .. } => element.alignment(),
            Type::Struct { fields, .. } => fields.iter().map(Type::alignment).max().unwrap_or(1),
            Type::Reference(_) => POINTER_SIZE,
            Type::Cone { generic, .. } => generic.alignment(),
        }
    }

    /// Leaf layout of the type, expanding nested structs depth-first
    ///
    /// Non-struct types flatten to themselves.
    pub fn flatten(&self) -> Vec<Type> {
        let mut leaves = Vec::new();
        self.flatten_into(&mut leaves);
        leaves
    }

    fn flatten_into(&self, leaves: &mut Vec<Type>) {
        match self {
            Type::Struct { fields, .. } => {
                for field in fields {
                    field.flatten_into(leaves);
                }
            }
            Type::Cone { generic, .. } if generic.is_struct() => generic.flatten_into(leaves),
            other => leaves.push(other.clone()),
        }
    }

    pub fn is_struct(&self) -> bool {
        match self {
            Type::Struct { .. } => true,
            Type::Cone { generic, .. } => generic.is_struct(),
            _ => false,
        }
    }

    pub fn as_builtin(&self) -> Option<BuiltinKind> {
        match self {
            Type::Builtin(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Symbol name of a struct or reference type, looking through generic applications
    pub fn symbol_name(&self) -> Option<&SymbolName> {
        match self {
            Type::Struct { name, .. } | Type::Reference(name) => Some(name),
            Type::Cone { generic, .. } => generic.symbol_name(),
            _ => None,
        }
    }

    fn decode_builtin(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.expect_tag("builtin type", BUILTIN_TAG)?;
        let offset = reader.position();
        let ordinal = reader.read_u8()?;
        BuiltinKind::from_ordinal(ordinal)
            .map(Type::Builtin)
            .ok_or(DecodeError::InvalidBuiltin { offset, ordinal })
    }

    fn decode_array(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.expect_tag("array type", ARRAY_TAG)?;
        let element = Type::decode(reader)?;
        let offset = reader.position();
        let dimensions = reader.read_u32()?;
        if dimensions == 0 {
            return Err(DecodeError::ZeroDimensions { offset });
        }
        Ok(Type::Array {
            element: Box::new(element),
            dimensions,
        })
    }

    fn decode_struct(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.expect_tag("struct type", STRUCT_TAG)?;
        let name = SymbolName::decode(reader)?;
        let fields = Vec::<Type>::decode(reader)?;
        Ok(Type::Struct { name, fields })
    }

    fn decode_reference(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.expect_tag("reference type", REFERENCE_TAG)?;
        Ok(Type::Reference(SymbolName::decode(reader)?))
    }

    fn decode_cone(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.expect_tag("cone type", CONE_TAG)?;
        let generic = Type::decode(reader)?;
        let arguments = Vec::<TypeArgument>::decode(reader)?;
        Ok(Type::cone(generic, arguments))
    }
}

impl From<BuiltinKind> for Type {
    fn from(kind: BuiltinKind) -> Self {
        Type::Builtin(kind)
    }
}

impl From<Type> for TypeArgument {
    fn from(ty: Type) -> Self {
        TypeArgument::Concrete(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Builtin(kind) => write!(f, "{}", kind),
            Type::Array {
                element,
                dimensions,
            } => write!(f, "{}[{}]", element, dimensions),
            Type::Struct { name, fields } => {
                write!(f, "struct {} {{", name)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                f.write_str("}")
            }
            Type::Reference(name) => write!(f, "{}", name),
            Type::Cone { generic, arguments } => {
                write!(f, "{}<", generic)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                f.write_str(">")
            }
        }
    }
}

impl fmt::Display for TypeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArgument::Star => f.write_str("*"),
            TypeArgument::Concrete(ty) => write!(f, "{}", ty),
        }
    }
}

impl Encode for Type {
    fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Type::Builtin(kind) => {
                writer.write_u8(BUILTIN_TAG);
                writer.write_u8(kind.ordinal());
            }
            Type::Array {
                element,
                dimensions,
            } => {
                writer.write_u8(ARRAY_TAG);
                element.encode(writer);
                writer.write_u32(*dimensions);
            }
            Type::Struct { name, fields } => {
                writer.write_u8(STRUCT_TAG);
                name.encode(writer);
                fields.encode(writer);
            }
            Type::Reference(name) => {
                writer.write_u8(REFERENCE_TAG);
                name.encode(writer);
            }
            Type::Cone { generic, arguments } => {
                writer.write_u8(CONE_TAG);
                generic.encode(writer);
                arguments.encode(writer);
            }
        }
    }
}

impl Decode for Type {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        reader.enter()?;
        let decoded = match reader.peek_u8()? {
            BUILTIN_TAG => Self::decode_builtin(reader),
            ARRAY_TAG => Self::decode_array(reader),
            STRUCT_TAG => Self::decode_struct(reader),
            REFERENCE_TAG => Self::decode_reference(reader),
            CONE_TAG => Self::decode_cone(reader),
            tag => Err(DecodeError::UnknownTag {
                what: "type",
                offset,
                tag,
            }),
        };
        reader.leave();

        let ty = decoded?;
        if matches!(ty, Type::Array { .. } | Type::Struct { .. }) && ty.checked_size().is_none() {
            return Err(DecodeError::SizeOverflow { offset });
        }
        Ok(ty)
    }
}

// A type argument travels as an optional type; absence is the wildcard.
impl Encode for TypeArgument {
    fn encode(&self, writer: &mut ByteWriter) {
        match self {
            TypeArgument::Star => writer.write_flag(false),
            TypeArgument::Concrete(ty) => {
                writer.write_flag(true);
                ty.encode(writer);
            }
        }
    }
}

impl Decode for TypeArgument {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(match Option::<Type>::decode(reader)? {
            Some(ty) => TypeArgument::Concrete(ty),
            None => TypeArgument::Star,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MAX_NESTING;

    fn name(full: &str) -> SymbolName {
        SymbolName::from_full_name(full)
    }

    #[test]
    fn test_builtin_sizes() {
        assert_eq!(BuiltinKind::Void.size(), 0);
        assert_eq!(BuiltinKind::Void.alignment(), 1);
        assert_eq!(BuiltinKind::Byte.size(), 1);
        assert_eq!(BuiltinKind::Char.size(), 2);
        assert_eq!(BuiltinKind::ULong.size(), 8);
        assert_eq!(BuiltinKind::Pointer.size(), POINTER_SIZE);
        assert_eq!(BuiltinKind::NativeFloat.size(), POINTER_SIZE);
    }

    #[test]
    fn test_mangled_codes_follow_ordinals() {
        assert_eq!(BuiltinKind::Void.mangled_code(), 'a');
        assert_eq!(BuiltinKind::Int.mangled_code(), 'd');
        assert_eq!(BuiltinKind::Pointer.mangled_code(), 'q');
        for kind in BuiltinKind::ALL {
            assert_eq!(BuiltinKind::from_mangled_code(kind.mangled_code()), Some(kind));
            assert_eq!(BuiltinKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BuiltinKind::from_mangled_code('r'), None);
    }

    #[test]
    fn test_struct_layout() {
        let inner = Type::struct_of(name("geo.Point"), vec![Type::INT, Type::INT]);
        let outer = Type::struct_of(name("geo.Line"), vec![inner.clone(), Type::DOUBLE, Type::BYTE]);

        assert_eq!(inner.size(), 8);
        assert_eq!(outer.size(), 8 + 8 + 1);
        assert_eq!(outer.alignment(), 8);
        assert_eq!(Type::struct_of(name("Empty"), vec![]).alignment(), 1);
        assert_eq!(
            outer.flatten(),
            vec![Type::INT, Type::INT, Type::DOUBLE, Type::BYTE]
        );
    }

    #[test]
    fn test_array_layout() {
        let array = Type::array(Type::SHORT, 5);
        assert_eq!(array.size(), 10);
        assert_eq!(array.alignment(), 2);
        assert_eq!(array.flatten(), vec![array.clone()]);
    }

    #[test]
    fn test_cone_delegates_layout() {
        let list = Type::reference(name("util.List"));
        let applied = Type::cone(list.clone(), vec![Type::INT.into(), TypeArgument::Star]);
        assert_eq!(applied.size(), POINTER_SIZE);
        assert_eq!(applied.symbol_name(), Some(&name("util.List")));
        assert_eq!(Type::cone(list.clone(), vec![]), list);
    }

    #[test]
    #[should_panic(expected = "at least one element")]
    fn test_zero_length_array_rejected() {
        let _ = Type::array(Type::INT, 0);
    }

    #[test]
    fn test_encode_builtin_layout() {
        assert_eq!(Type::INT.to_bytes(), vec![BUILTIN_TAG, 3]);
        assert_eq!(
            Type::array(Type::BYTE, 2).to_bytes(),
            vec![ARRAY_TAG, BUILTIN_TAG, 1, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            Type::from_bytes(&[9]),
            Err(DecodeError::UnknownTag { tag: 9, .. })
        ));
        assert!(matches!(
            Type::from_bytes(&[BUILTIN_TAG, 17]),
            Err(DecodeError::InvalidBuiltin { ordinal: 17, .. })
        ));
        assert!(matches!(
            Type::from_bytes(&[ARRAY_TAG, BUILTIN_TAG, 1, 0, 0, 0, 0]),
            Err(DecodeError::ZeroDimensions { offset: 3 })
        ));
        assert!(matches!(
            Type::from_bytes(&[ARRAY_TAG, BUILTIN_TAG]),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let mut bytes = vec![ARRAY_TAG; 200_000];
        bytes.extend_from_slice(&[BUILTIN_TAG, 3, 0, 0, 0, 1]);
        assert!(matches!(
            Type::from_bytes(&bytes),
            Err(DecodeError::NestingTooDeep { offset }) if offset == MAX_NESTING
        ));

        let nested = (0..MAX_NESTING - 1).fold(Type::INT, |ty, _| Type::array(ty, 1));
        assert_eq!(Type::from_bytes(&nested.to_bytes()).unwrap(), nested);
    }

    #[test]
    fn test_oversized_array_is_rejected() {
        let huge = (0..3).fold(Type::LONG, |ty, _| Type::array(ty, u32::MAX));
        assert_eq!(huge.checked_size(), None);
        assert_eq!(huge.size(), usize::MAX);
        assert!(matches!(
            Type::from_bytes(&huge.to_bytes()),
            Err(DecodeError::SizeOverflow { .. })
        ));

        let fields = vec![huge.clone(), Type::INT];
        assert_eq!(Type::struct_of(name("big.Blob"), fields).checked_size(), None);
    }

    #[test]
    fn test_empty_cone_decodes_to_its_generic() {
        let list = Type::reference(name("util.List"));
        let bare = Type::Cone {
            generic: Box::new(list.clone()),
            arguments: vec![],
        };
        assert_eq!(bare.to_bytes()[0], CONE_TAG);
        assert_eq!(Type::from_bytes(&bare.to_bytes()).unwrap(), list);
    }

    #[test]
    fn test_variant_decoder_checks_its_tag() {
        let mut reader = ByteReader::new(&[BUILTIN_TAG, 3]);
        let err = Type::decode_array(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TagMismatch {
                expected: ARRAY_TAG,
                found: BUILTIN_TAG,
                ..
            }
        ));
    }

    #[test]
    fn test_display() {
        let ty = Type::cone(
            Type::reference(name("util.Map")),
            vec![Type::array(Type::INT, 3).into(), TypeArgument::Star],
        );
        assert_eq!(ty.to_string(), "util.Map<int[3], *>");
    }
}
