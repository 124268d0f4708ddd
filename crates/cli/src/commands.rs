//! Command implementations
//!
//! Each command renders its report into a `String`; `main` prints it.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;

use cinterop_abi::{demangle_list, Decode, DeflateCompressor, SymbolName, SymbolTable, Type};
use cinterop_runtime::{CallingConvention, Ffi, FfiDescriptor, FfiType, LinkMode, NativeValue, SharedLibrary};

pub fn load_table(path: &Path, compressed: bool) -> Result<SymbolTable> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let table = if compressed {
        SymbolTable::from_compressed_bytes(&bytes, &DeflateCompressor::default())
    } else {
        SymbolTable::from_bytes(&bytes)
    };
    table.with_context(|| format!("{} is not a valid symbol table", path.display()))
}

pub fn dump(path: &Path, compressed: bool, verbose: bool) -> Result<String> {
    let table = load_table(path, compressed)?;
    let mut out = String::new();

    writeln!(
        out,
        "{} {} symbols",
        path.display().to_string().bold(),
        table.len()
    )?;
    for symbol in &table {
        writeln!(out, "  {} {}", symbol.id().to_string().dimmed(), symbol)?;
        if let Some(key) = symbol.mangled_signature() {
            writeln!(out, "      {} {}", "key:".cyan(), key)?;
        }
        if verbose {
            writeln!(out, "      {} {}", "at:".cyan(), symbol.info().to_trace_string())?;
            if let Some(original) = symbol.original_info() {
                writeln!(out, "      {} {}", "from:".cyan(), original.to_trace_string())?;
            }
        }
    }
    Ok(out)
}

pub fn demangle(names: &[String], table: Option<&Path>, compressed: bool) -> Result<String> {
    let table = table.map(|path| load_table(path, compressed)).transpose()?;
    let resolver = |name: &SymbolName| table.as_ref().and_then(|t| t.struct_fields(name));

    let mut out = String::new();
    for name in names {
        let types: Vec<Type> =
            demangle_list(name, &resolver).with_context(|| format!("failed to demangle '{}'", name))?;
        let rendered = if types.is_empty() {
            "(empty)".dimmed().to_string()
        } else {
            types.iter().map(Type::to_string).collect::<Vec<_>>().join(", ")
        };
        writeln!(out, "{} {} {}", name.bold(), "=>".green(), rendered)?;
    }
    Ok(out)
}

/// Parse a `KIND:VALUE` call argument
pub fn parse_argument(text: &str) -> Result<NativeValue> {
    let (kind, literal) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("argument '{}' is not of the form KIND:VALUE", text))?;
    let kind = parse_kind(kind)?;
    if kind == FfiType::Void {
        bail!("void is not an argument kind");
    }
    NativeValue::parse(kind, literal).ok_or_else(|| anyhow!("'{}' is not a valid {} literal", literal, kind))
}

fn parse_kind(name: &str) -> Result<FfiType> {
    FfiType::from_name(name.trim()).ok_or_else(|| {
        let known: Vec<&str> = FfiType::ALL.iter().map(|k| k.name()).collect();
        anyhow!("unknown kind '{}' (expected one of {})", name, known.join(", "))
    })
}

pub fn call(
    library: &str,
    symbol: &str,
    returns: &str,
    args: &[String],
    now: bool,
    verbose: bool,
) -> Result<String> {
    let return_type = parse_kind(returns)?;
    let values = args
        .iter()
        .map(|arg| parse_argument(arg))
        .collect::<Result<Vec<_>>>()?;
    let descriptor = FfiDescriptor::new(return_type, values.iter().map(NativeValue::kind).collect());

    let link_mode = if now { LinkMode::Now } else { LinkMode::Lazy };
    let lib = SharedLibrary::open(&[library], link_mode, false)?;
    let address = lib.get_function_address(symbol)?;
    log::debug!("Calling {} at {:p} as {}", symbol, address, descriptor);

    // SAFETY: the caller vouches that the declared kinds match the native signature
    let result = unsafe {
        Ffi::invoke_value(address, &descriptor, CallingConvention::Default, |buffer| {
            values.iter().try_for_each(|value| buffer.put_value(*value))
        })?
    };

    let mut out = String::new();
    if verbose {
        writeln!(out, "{} {}{}", "call:".cyan(), symbol, descriptor)?;
    }
    match result {
        NativeValue::Void => writeln!(out, "{} returned", symbol.bold())?,
        value => writeln!(out, "{} {} {}", symbol.bold(), "=>".green(), value)?,
    }
    Ok(out)
}

pub fn version() -> String {
    format!(
        "cinterop v{}\nstack size: {} bytes\n",
        env!("CARGO_PKG_VERSION"),
        cinterop_runtime::RuntimeConfig::global().stack_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinterop_abi::{Encode, FunctionSignature, Symbol, SymbolInfo};
    use std::io::Write;

    fn plain() {
        colored::control::set_override(false);
    }

    fn sample_table() -> SymbolTable {
        let info = |name: &str| SymbolInfo::new(SymbolName::from_full_name(name), 1, 1, "demo.kt");
        let vec2 = SymbolName::from_full_name("demo.Vec2");
        SymbolTable::new(vec![
            Symbol::structure(info("demo.Vec2"), vec![Type::FLOAT, Type::FLOAT]),
            Symbol::function(
                info("demo.length"),
                FunctionSignature::new(Type::FLOAT, vec![Type::struct_of(vec2, vec![Type::FLOAT, Type::FLOAT])]),
            ),
        ])
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_parse_argument() {
        assert_eq!(parse_argument("int:-5").unwrap(), NativeValue::I32(-5));
        assert_eq!(parse_argument("double:2.5").unwrap(), NativeValue::F64(2.5));
        assert!(parse_argument("int").is_err());
        assert!(parse_argument("void:1").is_err());
        assert!(parse_argument("quad:1").is_err());
        assert!(parse_argument("ubyte:300").is_err());
    }

    #[test]
    fn test_dump_lists_symbols() {
        plain();
        let file = write_temp(&sample_table().to_bytes());
        let out = dump(file.path(), false, true).unwrap();

        assert!(out.contains("2 symbols"));
        assert!(out.contains("struct demo.Vec2 {float, float}"));
        assert!(out.contains("key: F$demo_length$Rl$PS$demo_Vec2$S$D$E$X$G$F"));
        assert!(out.contains("at: demo.kt:1:1"));
    }

    #[test]
    fn test_dump_compressed_table() {
        plain();
        let bytes = sample_table()
            .to_compressed_bytes(&DeflateCompressor::default())
            .unwrap();
        let file = write_temp(&bytes);
        assert!(dump(file.path(), true, false).unwrap().contains("2 symbols"));
        assert!(dump(file.path(), false, false).is_err());
    }

    #[test]
    fn test_demangle_with_table() {
        plain();
        let file = write_temp(&sample_table().to_bytes());
        let names = vec!["dA$S$demo_Vec2$S$A".to_string(), String::new()];
        let out = demangle(&names, Some(file.path()), false).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "dA$S$demo_Vec2$S$A => int, struct demo.Vec2 {float, float}[1]");
        assert_eq!(lines[1], " => (empty)");

        let err = demangle(&["S$demo_Vec2$S".to_string()], None, false).unwrap_err();
        assert!(err.to_string().contains("S$demo_Vec2$S"));
    }

    #[test]
    fn test_call_c_runtime() {
        plain();
        let Some(libc) = SharedLibrary::try_open(cinterop_runtime::c_runtime_names(), LinkMode::Lazy, false) else {
            return;
        };
        let out = call(libc.name(), "abs", "int", &["int:-42".to_string()], false, false).unwrap();
        assert_eq!(out, "abs => 42\n");

        let err = call(libc.name(), "definitely_not_exported", "void", &[], false, false).unwrap_err();
        assert!(err.to_string().contains("definitely_not_exported"));
    }
}
