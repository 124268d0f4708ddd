//! Call signatures

use std::fmt;

use cinterop_abi::{FunctionSignature, Type};
use libffi::raw;

use super::FfiType;
use crate::error::RuntimeResult;

/// Calling convention of a native function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// The platform's C convention
    #[default]
    Default,
    Cdecl,
}

impl CallingConvention {
    pub(crate) fn abi(self) -> raw::ffi_abi {
        match self {
            CallingConvention::Default | CallingConvention::Cdecl => raw::ffi_abi_FFI_DEFAULT_ABI,
        }
    }
}

/// Return and parameter kinds of a native function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FfiDescriptor {
    pub return_type: FfiType,
    pub parameter_types: Vec<FfiType>,
}

impl FfiDescriptor {
    pub fn new(return_type: FfiType, parameter_types: Vec<FfiType>) -> Self {
        Self {
            return_type,
            parameter_types,
        }
    }

    pub fn from_types(return_type: &Type, parameter_types: &[Type]) -> RuntimeResult<Self> {
        Ok(Self {
            return_type: FfiType::from_type(return_type)?,
            parameter_types: parameter_types
                .iter()
                .map(FfiType::from_type)
                .collect::<RuntimeResult<_>>()?,
        })
    }

    /// Descriptor of a function symbol's native entry point
    ///
    /// Receivers come first, in [`FunctionSignature::native_parameters`] order.
    pub fn from_signature(signature: &FunctionSignature) -> RuntimeResult<Self> {
        Ok(Self {
            return_type: FfiType::from_type(&signature.return_type)?,
            parameter_types: signature
                .native_parameters()
                .into_iter()
                .map(FfiType::from_type)
                .collect::<RuntimeResult<_>>()?,
        })
    }

    /// Total bytes of a packed argument list
    pub fn arguments_size(&self) -> usize {
        self.parameter_types.iter().map(|kind| kind.size()).sum()
    }
}

impl fmt::Display for FfiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, kind) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kind)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinterop_abi::SymbolName;

    #[test]
    fn test_from_signature_orders_receivers_first() {
        let signature = FunctionSignature::new(Type::BOOL, vec![Type::DOUBLE])
            .with_dispatch_receiver(Type::reference(SymbolName::from_full_name("ui.Window")))
            .with_extension_receiver(Type::INT);
        let descriptor = FfiDescriptor::from_signature(&signature).unwrap();
        assert_eq!(descriptor.return_type, FfiType::Bool);
        assert_eq!(
            descriptor.parameter_types,
            vec![FfiType::Pointer, FfiType::I32, FfiType::F64]
        );
        assert_eq!(descriptor.to_string(), "(pointer, int, double) -> bool");
    }

    #[test]
    fn test_struct_parameters_are_rejected() {
        let point = Type::struct_of(SymbolName::from_full_name("geo.Point"), vec![Type::INT]);
        assert!(FfiDescriptor::from_types(&Type::VOID, &[point]).is_err());
    }

    #[test]
    fn test_arguments_size() {
        let descriptor = FfiDescriptor::new(FfiType::Void, vec![FfiType::I8, FfiType::F64, FfiType::U16]);
        assert_eq!(descriptor.arguments_size(), 11);
    }
}
