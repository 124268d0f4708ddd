//! Call-interface value kinds

use std::fmt;

use cinterop_abi::{BuiltinKind, Type};
use libffi::middle;

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::NativeFloatRepr;

/// Kind of a value passed to or returned from a native call
///
/// Mirrors [`BuiltinKind`] one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfiType {
    Void,
    I8,
    I16,
    I32,
    I64,
    ISize,
    U8,
    U16,
    U32,
    U64,
    USize,
    F32,
    F64,
    NativeFloat,
    Bool,
    Char,
    Pointer,
}

impl FfiType {
    pub const ALL: [FfiType; 17] = [
        FfiType::Void,
        FfiType::I8,
        FfiType::I16,
        FfiType::I32,
        FfiType::I64,
        FfiType::ISize,
        FfiType::U8,
        FfiType::U16,
        FfiType::U32,
        FfiType::U64,
        FfiType::USize,
        FfiType::F32,
        FfiType::F64,
        FfiType::NativeFloat,
        FfiType::Bool,
        FfiType::Char,
        FfiType::Pointer,
    ];

    /// Size in bytes
    pub fn size(self) -> usize {
        self.to_builtin().size()
    }

    pub fn alignment(self) -> usize {
        self.to_builtin().alignment()
    }

    pub fn is_floating(self) -> bool {
        matches!(self, FfiType::F32 | FfiType::F64 | FfiType::NativeFloat)
    }

    /// Integer kinds narrower than a register slot, returned widened
    pub(crate) fn is_widened_return(self) -> bool {
        matches!(
            self,
            FfiType::I8
                | FfiType::I16
                | FfiType::I32
                | FfiType::U8
                | FfiType::U16
                | FfiType::U32
                | FfiType::Bool
                | FfiType::Char
        )
    }

    pub fn from_builtin(kind: BuiltinKind) -> Self {
        match kind {
            BuiltinKind::Void => FfiType::Void,
            BuiltinKind::Byte => FfiType::I8,
            BuiltinKind::Short => FfiType::I16,
            BuiltinKind::Int => FfiType::I32,
            BuiltinKind::Long => FfiType::I64,
            BuiltinKind::NativeInt => FfiType::ISize,
            BuiltinKind::UByte => FfiType::U8,
            BuiltinKind::UShort => FfiType::U16,
            BuiltinKind::UInt => FfiType::U32,
            BuiltinKind::ULong => FfiType::U64,
            BuiltinKind::NativeUInt => FfiType::USize,
            BuiltinKind::Float => FfiType::F32,
            BuiltinKind::Double => FfiType::F64,
            BuiltinKind::NativeFloat => FfiType::NativeFloat,
            BuiltinKind::Bool => FfiType::Bool,
            BuiltinKind::Char => FfiType::Char,
            BuiltinKind::Pointer => FfiType::Pointer,
        }
    }

    pub fn to_builtin(self) -> BuiltinKind {
        match self {
            FfiType::Void => BuiltinKind::Void,
            FfiType::I8 => BuiltinKind::Byte,
            FfiType::I16 => BuiltinKind::Short,
            FfiType::I32 => BuiltinKind::Int,
            FfiType::I64 => BuiltinKind::Long,
            FfiType::ISize => BuiltinKind::NativeInt,
            FfiType::U8 => BuiltinKind::UByte,
            FfiType::U16 => BuiltinKind::UShort,
            FfiType::U32 => BuiltinKind::UInt,
            FfiType::U64 => BuiltinKind::ULong,
            FfiType::USize => BuiltinKind::NativeUInt,
            FfiType::F32 => BuiltinKind::Float,
            FfiType::F64 => BuiltinKind::Double,
            FfiType::NativeFloat => BuiltinKind::NativeFloat,
            FfiType::Bool => BuiltinKind::Bool,
            FfiType::Char => BuiltinKind::Char,
            FfiType::Pointer => BuiltinKind::Pointer,
        }
    }

    /// Kind a value of type `ty` travels as
    ///
    /// References are passed as pointers and generic applications as their
    /// generic type. Arrays and structs have no by-value representation here.
    pub fn from_type(ty: &Type) -> RuntimeResult<Self> {
        match ty {
            Type::Builtin(kind) => Ok(Self::from_builtin(*kind)),
            Type::Reference(_) => Ok(FfiType::Pointer),
            Type::Cone { generic, .. } => Self::from_type(generic),
            Type::Array { .. } | Type::Struct { .. } => Err(RuntimeError::UnsupportedType(ty.to_string())),
        }
    }

    /// Parse the builtin spelling (`int`, `double`, `pointer`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        BuiltinKind::from_name(name).map(Self::from_builtin)
    }

    pub fn name(self) -> &'static str {
        self.to_builtin().name()
    }

    pub(crate) fn to_libffi(self) -> middle::Type {
        match self {
            FfiType::Void => middle::Type::void(),
            FfiType::I8 => middle::Type::i8(),
            FfiType::I16 => middle::Type::i16(),
            FfiType::I32 => middle::Type::i32(),
            FfiType::I64 => middle::Type::i64(),
            FfiType::ISize => middle::Type::isize(),
            FfiType::U8 | FfiType::Bool => middle::Type::u8(),
            FfiType::U16 | FfiType::Char => middle::Type::u16(),
            FfiType::U32 => middle::Type::u32(),
            FfiType::U64 => middle::Type::u64(),
            FfiType::USize => middle::Type::usize(),
            FfiType::F32 => middle::Type::f32(),
            FfiType::F64 => middle::Type::f64(),
            FfiType::NativeFloat => {
                if std::mem::size_of::<NativeFloatRepr>() == 8 {
                    middle::Type::f64()
                } else {
                    middle::Type::f32()
                }
            }
            FfiType::Pointer => middle::Type::pointer(),
        }
    }
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
