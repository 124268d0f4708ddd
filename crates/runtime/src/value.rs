//! Native scalar values
//!
//! [`Primitive`] ties a Rust type to the [`FfiType`] it travels as.
//! [`NativeValue`] is the dynamically typed form used by `put_value`,
//! `get_value` and upcall returns.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use crate::ffi::FfiType;

/// Platform-width floating point representation
#[cfg(target_pointer_width = "64")]
pub type NativeFloatRepr = f64;
#[cfg(not(target_pointer_width = "64"))]
pub type NativeFloatRepr = f32;

/// Floating point number as wide as a pointer
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct NativeFloat(pub NativeFloatRepr);

impl From<NativeFloatRepr> for NativeFloat {
    fn from(value: NativeFloatRepr) -> Self {
        NativeFloat(value)
    }
}

/// UTF-16 code unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NativeChar(pub u16);

impl NativeChar {
    /// Characters outside the basic multilingual plane do not fit in one unit
    pub fn from_char(c: char) -> Option<Self> {
        u16::try_from(c as u32).ok().map(NativeChar)
    }

    /// `None` for lone surrogates
    pub fn to_char(self) -> Option<char> {
        char::from_u32(self.0 as u32)
    }
}

/// Rust types with a fixed native representation
pub trait Primitive: Copy + 'static {
    const KIND: FfiType;

    fn into_value(self) -> NativeValue;

    fn from_value(value: NativeValue) -> Option<Self>;

    /// Read a value from possibly unaligned memory
    ///
    /// # Safety
    /// `src` must be valid for reads of `KIND.size()` bytes.
    #[inline]
    unsafe fn read_raw(src: *const u8) -> Self {
        ptr::read_unaligned(src as *const Self)
    }

    /// Write a value to possibly unaligned memory
    ///
    /// # Safety
    /// `dst` must be valid for writes of `KIND.size()` bytes.
    #[inline]
    unsafe fn write_raw(self, dst: *mut u8) {
        ptr::write_unaligned(dst as *mut Self, self)
    }
}

macro_rules! impl_primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const KIND: FfiType = FfiType::$kind;

                #[inline]
                fn into_value(self) -> NativeValue {
                    NativeValue::$kind(self)
                }

                #[inline]
                fn from_value(value: NativeValue) -> Option<Self> {
                    match value {
                        NativeValue::$kind(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_primitive! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => ISize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => USize,
    f32 => F32,
    f64 => F64,
    NativeFloat => NativeFloat,
    NativeChar => Char,
    *mut c_void => Pointer,
}

impl Primitive for () {
    const KIND: FfiType = FfiType::Void;

    fn into_value(self) -> NativeValue {
        NativeValue::Void
    }

    fn from_value(value: NativeValue) -> Option<Self> {
        matches!(value, NativeValue::Void).then_some(())
    }
}

impl Primitive for bool {
    const KIND: FfiType = FfiType::Bool;

    fn into_value(self) -> NativeValue {
        NativeValue::Bool(self)
    }

    fn from_value(value: NativeValue) -> Option<Self> {
        match value {
            NativeValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    // Any non-zero byte is true
    #[inline]
    unsafe fn read_raw(src: *const u8) -> Self {
        *src != 0
    }

    #[inline]
    unsafe fn write_raw(self, dst: *mut u8) {
        *dst = self as u8;
    }
}

impl Primitive for *const c_void {
    const KIND: FfiType = FfiType::Pointer;

    fn into_value(self) -> NativeValue {
        NativeValue::Pointer(self as *mut c_void)
    }

    fn from_value(value: NativeValue) -> Option<Self> {
        match value {
            NativeValue::Pointer(v) => Some(v as *const c_void),
            _ => None,
        }
    }
}

/// Dynamically typed native scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Void,
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    ISize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    USize(usize),
    F32(f32),
    F64(f64),
    NativeFloat(NativeFloat),
    Bool(bool),
    Char(NativeChar),
    Pointer(*mut c_void),
}

impl NativeValue {
    pub fn kind(&self) -> FfiType {
        match self {
            NativeValue::Void => FfiType::Void,
            NativeValue::I8(_) => FfiType::I8,
            NativeValue::I16(_) => FfiType::I16,
            NativeValue::I32(_) => FfiType::I32,
            NativeValue::I64(_) => FfiType::I64,
            NativeValue::ISize(_) => FfiType::ISize,
            NativeValue::U8(_) => FfiType::U8,
            NativeValue::U16(_) => FfiType::U16,
            NativeValue::U32(_) => FfiType::U32,
            NativeValue::U64(_) => FfiType::U64,
            NativeValue::USize(_) => FfiType::USize,
            NativeValue::F32(_) => FfiType::F32,
            NativeValue::F64(_) => FfiType::F64,
            NativeValue::NativeFloat(_) => FfiType::NativeFloat,
            NativeValue::Bool(_) => FfiType::Bool,
            NativeValue::Char(_) => FfiType::Char,
            NativeValue::Pointer(_) => FfiType::Pointer,
        }
    }

    /// Integer view of integer, bool, char and pointer values
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            NativeValue::I8(v) => v as i128,
            NativeValue::I16(v) => v as i128,
            NativeValue::I32(v) => v as i128,
            NativeValue::I64(v) => v as i128,
            NativeValue::ISize(v) => v as i128,
            NativeValue::U8(v) => v as i128,
            NativeValue::U16(v) => v as i128,
            NativeValue::U32(v) => v as i128,
            NativeValue::U64(v) => v as i128,
            NativeValue::USize(v) => v as i128,
            NativeValue::Bool(v) => v as i128,
            NativeValue::Char(v) => v.0 as i128,
            NativeValue::Pointer(v) => v as usize as i128,
            _ => return None,
        })
    }

    /// Floating view of any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            NativeValue::F32(v) => Some(v as f64),
            NativeValue::F64(v) => Some(v),
            NativeValue::NativeFloat(v) => Some(v.0 as f64),
            NativeValue::Pointer(_) | NativeValue::Void => None,
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// Convert with `as`-cast semantics
    ///
    /// Returns `None` when one side is void or when a float would become a pointer.
    pub fn cast(self, kind: FfiType) -> Option<NativeValue> {
        if self.kind() == kind {
            return Some(self);
        }
        if kind == FfiType::Void || self.kind() == FfiType::Void {
            return None;
        }
        if kind.is_floating() {
            let v = self.as_f64()?;
            return Some(match kind {
                FfiType::F32 => NativeValue::F32(v as f32),
                FfiType::F64 => NativeValue::F64(v),
                _ => NativeValue::NativeFloat(NativeFloat(v as NativeFloatRepr)),
            });
        }
        let v = match self.as_i128() {
            Some(v) => v,
            None => {
                if kind == FfiType::Pointer {
                    return None;
                }
                self.as_f64()? as i128
            }
        };
        Some(match kind {
            FfiType::I8 => NativeValue::I8(v as i8),
            FfiType::I16 => NativeValue::I16(v as i16),
            FfiType::I32 => NativeValue::I32(v as i32),
            FfiType::I64 => NativeValue::I64(v as i64),
            FfiType::ISize => NativeValue::ISize(v as isize),
            FfiType::U8 => NativeValue::U8(v as u8),
            FfiType::U16 => NativeValue::U16(v as u16),
            FfiType::U32 => NativeValue::U32(v as u32),
            FfiType::U64 => NativeValue::U64(v as u64),
            FfiType::USize => NativeValue::USize(v as usize),
            FfiType::Bool => NativeValue::Bool(v != 0),
            FfiType::Char => NativeValue::Char(NativeChar(v as u16)),
            FfiType::Pointer => NativeValue::Pointer(v as usize as *mut c_void),
            _ => return None,
        })
    }

    /// Write the value's native bytes to `dst`
    ///
    /// # Safety
    /// `dst` must be valid for writes of `self.kind().size()` bytes.
    pub unsafe fn write_raw(self, dst: *mut u8) {
        match self {
            NativeValue::Void => {}
            NativeValue::I8(v) => v.write_raw(dst),
            NativeValue::I16(v) => v.write_raw(dst),
            NativeValue::I32(v) => v.write_raw(dst),
            NativeValue::I64(v) => v.write_raw(dst),
            NativeValue::ISize(v) => v.write_raw(dst),
            NativeValue::U8(v) => v.write_raw(dst),
            NativeValue::U16(v) => v.write_raw(dst),
            NativeValue::U32(v) => v.write_raw(dst),
            NativeValue::U64(v) => v.write_raw(dst),
            NativeValue::USize(v) => v.write_raw(dst),
            NativeValue::F32(v) => v.write_raw(dst),
            NativeValue::F64(v) => v.write_raw(dst),
            NativeValue::NativeFloat(v) => v.write_raw(dst),
            NativeValue::Bool(v) => v.write_raw(dst),
            NativeValue::Char(v) => v.write_raw(dst),
            NativeValue::Pointer(v) => v.write_raw(dst),
        }
    }

    /// Read a value of `kind` from `src`
    ///
    /// # Safety
    /// `src` must be valid for reads of `kind.size()` bytes.
    pub unsafe fn read_raw(kind: FfiType, src: *const u8) -> NativeValue {
        match kind {
            FfiType::Void => NativeValue::Void,
            FfiType::I8 => NativeValue::I8(i8::read_raw(src)),
            FfiType::I16 => NativeValue::I16(i16::read_raw(src)),
            FfiType::I32 => NativeValue::I32(i32::read_raw(src)),
            FfiType::I64 => NativeValue::I64(i64::read_raw(src)),
            FfiType::ISize => NativeValue::ISize(isize::read_raw(src)),
            FfiType::U8 => NativeValue::U8(u8::read_raw(src)),
            FfiType::U16 => NativeValue::U16(u16::read_raw(src)),
            FfiType::U32 => NativeValue::U32(u32::read_raw(src)),
            FfiType::U64 => NativeValue::U64(u64::read_raw(src)),
            FfiType::USize => NativeValue::USize(usize::read_raw(src)),
            FfiType::F32 => NativeValue::F32(f32::read_raw(src)),
            FfiType::F64 => NativeValue::F64(f64::read_raw(src)),
            FfiType::NativeFloat => NativeValue::NativeFloat(NativeFloat::read_raw(src)),
            FfiType::Bool => NativeValue::Bool(bool::read_raw(src)),
            FfiType::Char => NativeValue::Char(NativeChar::read_raw(src)),
            FfiType::Pointer => NativeValue::Pointer(<*mut c_void>::read_raw(src)),
        }
    }

    /// Parse a literal of the given kind, as typed on a command line
    pub fn parse(kind: FfiType, text: &str) -> Option<NativeValue> {
        let text = text.trim();
        Some(match kind {
            FfiType::Void => return None,
            FfiType::I8 => NativeValue::I8(text.parse().ok()?),
            FfiType::I16 => NativeValue::I16(text.parse().ok()?),
            FfiType::I32 => NativeValue::I32(text.parse().ok()?),
            FfiType::I64 => NativeValue::I64(text.parse().ok()?),
            FfiType::ISize => NativeValue::ISize(text.parse().ok()?),
            FfiType::U8 => NativeValue::U8(text.parse().ok()?),
            FfiType::U16 => NativeValue::U16(text.parse().ok()?),
            FfiType::U32 => NativeValue::U32(text.parse().ok()?),
            FfiType::U64 => NativeValue::U64(text.parse().ok()?),
            FfiType::USize => NativeValue::USize(text.parse().ok()?),
            FfiType::F32 => NativeValue::F32(text.parse().ok()?),
            FfiType::F64 => NativeValue::F64(text.parse().ok()?),
            FfiType::NativeFloat => NativeValue::NativeFloat(NativeFloat(text.parse().ok()?)),
            FfiType::Bool => NativeValue::Bool(text.parse().ok()?),
            FfiType::Char => {
                let mut chars = text.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                NativeValue::Char(NativeChar::from_char(c)?)
            }
            FfiType::Pointer => {
                let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
                NativeValue::Pointer(usize::from_str_radix(digits, 16).ok()? as *mut c_void)
            }
        })
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Void => f.write_str("void"),
            NativeValue::I8(v) => write!(f, "{}", v),
            NativeValue::I16(v) => write!(f, "{}", v),
            NativeValue::I32(v) => write!(f, "{}", v),
            NativeValue::I64(v) => write!(f, "{}", v),
            NativeValue::ISize(v) => write!(f, "{}", v),
            NativeValue::U8(v) => write!(f, "{}", v),
            NativeValue::U16(v) => write!(f, "{}", v),
            NativeValue::U32(v) => write!(f, "{}", v),
            NativeValue::U64(v) => write!(f, "{}", v),
            NativeValue::USize(v) => write!(f, "{}", v),
            NativeValue::F32(v) => write!(f, "{}", v),
            NativeValue::F64(v) => write!(f, "{}", v),
            NativeValue::NativeFloat(v) => write!(f, "{}", v.0),
            NativeValue::Bool(v) => write!(f, "{}", v),
            NativeValue::Char(v) => match v.to_char() {
                Some(c) => write!(f, "'{}'", c),
                None => write!(f, "\\u{{{:04x}}}", v.0),
            },
            NativeValue::Pointer(v) => write!(f, "{:p}", *v),
        }
    }
}
