//! Compiles the C fixture library used by the integration tests.
//!
//! The path of the built library is exported as `CINTEROP_TESTLIB`. When no C
//! compiler is available the variable is empty and the native tests skip.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SOURCE: &str = "tests/native/testlib.c";

fn library_file_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "cinterop_testlib.dll"
    } else if cfg!(target_os = "macos") {
        "libcinterop_testlib.dylib"
    } else {
        "libcinterop_testlib.so"
    }
}

fn compile(out_dir: &Path) -> Result<PathBuf, String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .try_get_compiler()
        .map_err(|e| e.to_string())?;
    let output = out_dir.join(library_file_name());

    let mut command: Command = compiler.to_command();
    if compiler.is_like_msvc() {
        command
            .arg("/LD")
            .arg(SOURCE)
            .arg(format!("/Fe{}", output.display()))
            .arg(format!("/Fo{}\\", out_dir.display()));
    } else {
        command.args(["-shared", "-fPIC", "-O1", "-o"]).arg(&output).arg(SOURCE);
    }

    let status = command.status().map_err(|e| e.to_string())?;
    if status.success() {
        Ok(output)
    } else {
        Err(format!("compiler exited with {}", status))
    }
}

fn main() {
    println!("cargo:rerun-if-changed={}", SOURCE);
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            println!("cargo:rustc-env=CINTEROP_TESTLIB=");
            return;
        }
    };

    match compile(&out_dir) {
        Ok(path) => println!("cargo:rustc-env=CINTEROP_TESTLIB={}", path.display()),
        Err(e) => {
            println!("cargo:warning=native test library not built: {}", e);
            println!("cargo:rustc-env=CINTEROP_TESTLIB=");
        }
    }
}
