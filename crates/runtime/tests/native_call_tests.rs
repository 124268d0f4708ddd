//! Native call tests against the C fixture library built by build.rs
//!
//! Every test returns early when the fixture could not be compiled.

use std::any::Any;
use std::ffi::{c_void, CString};
use std::sync::Arc;

use cinterop_runtime::{
    CallingConvention, Ffi, FfiArgBuffer, FfiDescriptor, FfiType, LinkMode, MemoryStack, NativeChar, NativeValue,
    RuntimeError, SharedLibrary,
};

fn testlib() -> Option<Arc<SharedLibrary>> {
    let path = option_env!("CINTEROP_TESTLIB").filter(|p| !p.is_empty())?;
    let _ = env_logger::builder().is_test(true).try_init();
    Some(SharedLibrary::open(&[path], LinkMode::Now, false).expect("fixture library should load"))
}

#[test]
fn test_add_through_argument_buffer() {
    let Some(lib) = testlib() else { return };
    let add = lib.get_function_address("add").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32, FfiType::I32]);

    let first_base = MemoryStack::with_current(|stack| {
        let mut buffer = FfiArgBuffer::acquire(stack);
        buffer.put_i32(5);
        buffer.put_i32(7);
        let result = unsafe { Ffi::call_i32(add, &descriptor, CallingConvention::Default, &buffer) };
        assert_eq!(result.unwrap(), 12);
        buffer.base_address()
    });

    let second_base = MemoryStack::with_current(|stack| {
        let buffer = FfiArgBuffer::acquire(stack);
        buffer.base_address()
    });
    assert_eq!(first_base, second_base);
}

#[test]
fn test_typed_invocations() {
    let Some(lib) = testlib() else { return };
    let conv = CallingConvention::Default;

    let test1 = lib.get_function_address("testlib_test1").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::I32, vec![]);
    assert_eq!(unsafe { Ffi::invoke_i32(test1, &descriptor, conv, |_| Ok(())) }.unwrap(), 1337);

    let test2 = lib.get_function_address("testlib_test2").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32, FfiType::I32]);
    let equal = unsafe {
        Ffi::invoke_i32(test2, &descriptor, conv, |args| {
            args.put_all(&[&4i32 as &dyn Any, &4i32])
        })
    };
    assert_eq!(equal.unwrap(), 1);

    let scale = lib.get_function_address("scale").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::F64, vec![FfiType::F64, FfiType::F32]);
    let scaled = unsafe {
        Ffi::invoke_f64(scale, &descriptor, conv, |args| {
            args.put_f64(2.5);
            args.put_f32(4.0);
            Ok(())
        })
    };
    assert_eq!(scaled.unwrap(), 10.0);

    let upper = lib.get_function_address("upper_char").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::Char, vec![FfiType::Char]);
    let c = unsafe {
        Ffi::invoke_char(upper, &descriptor, conv, |args| {
            args.put_char(NativeChar::from_char('q').unwrap());
            Ok(())
        })
    };
    assert_eq!(c.unwrap().to_char(), Some('Q'));
}

#[test]
fn test_pointer_arguments() {
    let Some(lib) = testlib() else { return };
    let sum_bytes = lib.get_function_address("sum_bytes").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::I64, vec![FfiType::Pointer, FfiType::USize]);
    let bytes: Vec<u8> = vec![1, 2, 3, 250];

    let total = unsafe {
        Ffi::invoke_value(sum_bytes, &descriptor, CallingConvention::Default, |args| {
            args.put_pointer(bytes.as_ptr() as *mut c_void);
            args.put_usize(bytes.len());
            Ok(())
        })
    };
    assert_eq!(total.unwrap(), NativeValue::I64(256));
}

#[test]
fn test_upcall_from_native_code() {
    let Some(lib) = testlib() else { return };
    let apply = lib.get_function_address("apply_binary").unwrap();

    let op = FfiDescriptor::new(FfiType::I32, vec![FfiType::I32, FfiType::I32]);
    let stub = Ffi::create_upcall_stub(op, CallingConvention::Default, |args| {
        let a = args.get_i32();
        let b = args.get_i32();
        NativeValue::I32(a - b)
    });

    let descriptor = FfiDescriptor::new(FfiType::I32, vec![FfiType::Pointer, FfiType::I32, FfiType::I32]);
    let result = unsafe {
        Ffi::invoke_i32(apply, &descriptor, CallingConvention::Default, |args| {
            args.put_pointer(stub.code_ptr() as *mut c_void);
            args.put_i32(50);
            args.put_i32(8);
            Ok(())
        })
    };
    assert_eq!(result.unwrap(), 42);
}

#[test]
fn test_library_registry_and_close() {
    let Some(path) = option_env!("CINTEROP_TESTLIB").filter(|p| !p.is_empty()) else { return };

    let first = SharedLibrary::open(&["libdoes-not-exist.so", path], LinkMode::Lazy, true).unwrap();
    let second = SharedLibrary::open(&[path], LinkMode::Lazy, false).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.name(), path);

    match first.get_function_address("no_such_symbol") {
        Err(RuntimeError::SymbolNotFound { symbol, .. }) => assert_eq!(symbol, "no_such_symbol"),
        other => panic!("unexpected result {:?}", other),
    }
    assert!(first.find_function_address("no_such_symbol").unwrap().is_none());
    assert!(matches!(
        first.find_function_address("bad\0symbol"),
        Err(RuntimeError::InvalidName(_))
    ));
}

#[test]
fn test_c_runtime_strlen() {
    let Ok(libc) = SharedLibrary::open_c_runtime() else { return };
    let strlen = libc.get_function_address("strlen").unwrap();
    let descriptor = FfiDescriptor::new(FfiType::USize, vec![FfiType::Pointer]);
    let text = CString::new("native").unwrap();

    let len = unsafe {
        Ffi::invoke_usize(strlen, &descriptor, CallingConvention::Default, |args| {
            args.put_pointer(text.as_ptr() as *mut c_void);
            Ok(())
        })
    };
    assert_eq!(len.unwrap(), 6);
}

#[test]
fn test_closed_library_rejects_lookups() {
    let Ok(libm) = SharedLibrary::open(&["libm.so.6", "libm.dylib", "libm.so"], LinkMode::Lazy, false) else {
        return;
    };
    assert!(libm.is_open());
    libm.close();
    libm.close();
    assert!(!libm.is_open());
    assert!(matches!(libm.get_function_address("cos"), Err(RuntimeError::LibraryClosed(_))));

    let reopened = SharedLibrary::open(&[libm.name()], LinkMode::Lazy, false).unwrap();
    assert!(!Arc::ptr_eq(&libm, &reopened));
    assert!(reopened.find_function_address("cos").unwrap().is_some());
}
