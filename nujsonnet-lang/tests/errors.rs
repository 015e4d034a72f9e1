#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

//! Error texts and stack traces.

use nujsonnet_lang::error::Error;
use nujsonnet_lang::vm::Vm;

#[track_caller]
fn eval_err(filename: &str, input: &str) -> Error {
    let mut vm = Vm::new();
    vm.evaluate_snippet(filename, input).unwrap_err()
}

#[test]
fn test_simple_error_trace() {
    let Error::Runtime(e) = eval_err("error.jsonnet", "error \"x\"") else {
        panic!("expected a runtime error");
    };
    assert_eq!(e.message, "x");
    assert_eq!(e.stack.len(), 1);
    assert_eq!(e.stack[0].location, "error.jsonnet:1:1-10");
    assert_eq!(e.stack[0].context, "$");
    assert_eq!(
        e.to_string(),
        "RUNTIME ERROR: x\n\terror.jsonnet:1:1-10\t$",
    );
}

#[test]
fn test_error_in_function_trace() {
    let input = "local x(n) = if n == 0 then error \"x\" else x(n - 1); x(3)";
    let Error::Runtime(e) = eval_err("error_in_func.jsonnet", input) else {
        panic!("expected a runtime error");
    };
    assert_eq!(e.message, "x");
    let frames: Vec<(String, String)> = e
        .stack
        .iter()
        .map(|f| (f.location.clone(), f.context.clone()))
        .collect();
    assert_eq!(
        frames,
        vec![
            ("error_in_func.jsonnet:1:29-38".into(), "function <x>".into()),
            ("error_in_func.jsonnet:1:44-52".into(), "function <x>".into()),
            ("error_in_func.jsonnet:1:44-52".into(), "function <x>".into()),
            ("error_in_func.jsonnet:1:44-52".into(), "function <x>".into()),
            ("error_in_func.jsonnet:1:54-58".into(), "$".into()),
        ],
    );
}

#[test]
fn test_error_in_error() {
    let Error::Runtime(e) = eval_err("err.jsonnet", "error (error \"x\")") else {
        panic!("expected a runtime error");
    };
    assert_eq!(e.message, "x");
    assert_eq!(e.stack[0].location, "err.jsonnet:1:8-17");
}

#[test]
fn test_object_field_context() {
    let Error::Runtime(e) = eval_err("obj.jsonnet", "{a: error \"boom\"}") else {
        panic!("expected a runtime error");
    };
    assert_eq!(e.message, "boom");
    assert_eq!(e.stack[0].context, "object <a>");
    assert_eq!(e.stack.last().unwrap().context, "$");
}

#[test]
fn test_static_errors() {
    let err = eval_err("bad.jsonnet", "local x = 1; y");
    let Error::Static(e) = err else {
        panic!("expected a static error");
    };
    assert_eq!(e.location, "bad.jsonnet:1:14");
    assert_eq!(e.message, "Unknown variable: y");
    assert_eq!(
        e.to_string(),
        "STATIC ERROR: bad.jsonnet:1:14 Unknown variable: y",
    );

    assert!(matches!(
        eval_err("bad.jsonnet", "{foo: myVar}"),
        Error::Static(e) if e.location == "bad.jsonnet:1:7-12"
            && e.message == "Unknown variable: myVar",
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "1 +"),
        Error::Static(_),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "self.a"),
        Error::Static(e) if e.message.contains("self outside"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "local x = 1, x = 2; x"),
        Error::Static(e) if e.message.contains("duplicate local var"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "{a: 1, a: 2}"),
        Error::Static(e) if e.message.contains("duplicate field"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "local f(a, a) = a; f(1, 2)"),
        Error::Static(e) if e.message.contains("duplicate parameter"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "local f(a) = a; f(a=1, 2)"),
        Error::Static(e) if e.message.contains("positional argument after"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "import 1 + 2"),
        Error::Static(e) if e.message.contains("computed imports"),
    ));
    assert!(matches!(
        eval_err("bad.jsonnet", "\"\\q\""),
        Error::Static(e) if e.message.contains("invalid escape"),
    ));
}

#[test]
fn test_max_stack() {
    let mut vm = Vm::new();
    vm.set_max_stack(20);
    let err = vm
        .evaluate_snippet("deep.jsonnet", "local f(n) = if n == 0 then 0 else f(n - 1); f(100)")
        .unwrap_err();
    let Error::Runtime(e) = err else {
        panic!("expected a runtime error");
    };
    assert_eq!(e.message, "max stack frames exceeded.");

    // The same recursion fits under the default budget.
    let mut vm = Vm::new();
    let output = vm
        .evaluate_snippet("deep.jsonnet", "local f(n) = if n == 0 then 0 else f(n - 1); f(100)")
        .unwrap();
    assert_eq!(output, "0\n");
}

#[test]
fn test_trace_truncation() {
    let mut vm = Vm::new();
    vm.set_max_trace(6);
    let err = vm
        .evaluate_snippet(
            "deep.jsonnet",
            "local f(n) = if n == 0 then error \"end\" else f(n - 1); f(30)",
        )
        .unwrap_err();
    let Error::Runtime(e) = err else {
        panic!("expected a runtime error");
    };
    // Head, marker, tail.
    assert_eq!(e.stack.len(), 7);
    assert_eq!(e.stack[3].location, "...");
    assert_eq!(e.stack.last().unwrap().context, "$");
}

#[test]
fn test_import_failure() {
    // The default importer finds nothing for a missing relative path.
    let Error::Runtime(e) = eval_err("imp.jsonnet", "import \"no_such_file.jsonnet\"") else {
        panic!("expected a runtime error");
    };
    assert!(e.message.contains("couldn't open import"));
}

#[test]
fn test_manifest_function_error() {
    let Error::Runtime(e) = eval_err("f.jsonnet", "[function() 1]") else {
        panic!("expected a runtime error");
    };
    assert!(e.message.contains("couldn't manifest function"));

    let Error::Runtime(e) = eval_err("f.jsonnet", "{a: function() 1}") else {
        panic!("expected a runtime error");
    };
    assert!(e.message.contains("couldn't manifest function"));
}
