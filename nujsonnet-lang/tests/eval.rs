#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

//! Language-semantics tests: evaluation, inheritance, laziness and
//! manifestation, checked through the manifested JSON.

use nujsonnet_lang::vm::Vm;

#[track_caller]
fn eval(input: &str) -> String {
    let mut vm = Vm::new();
    vm.evaluate_snippet("test.jsonnet", input).unwrap()
}

/// Evaluates and strips the indentation/newlines for compact comparison.
#[track_caller]
fn eval_flat(input: &str) -> String {
    let output = eval(input);
    let mut flat = String::new();
    let mut pending_space = false;
    for chr in output.chars() {
        if chr == '\n' || chr == ' ' {
            pending_space = true;
        } else {
            if pending_space && !flat.is_empty() {
                flat.push(' ');
            }
            pending_space = false;
            flat.push(chr);
        }
    }
    flat
}

#[track_caller]
fn eval_err(input: &str) -> String {
    let mut vm = Vm::new();
    match vm.evaluate_snippet("test.jsonnet", input) {
        Ok(output) => panic!("expected error, got {output:?}"),
        Err(e) => e.to_string(),
    }
}

#[test]
fn test_literals() {
    assert_eq!(eval("null"), "null\n");
    assert_eq!(eval("true"), "true\n");
    assert_eq!(eval("false"), "false\n");
    assert_eq!(eval("0"), "0\n");
    assert_eq!(eval("-0"), "-0\n");
    assert_eq!(eval("1.5"), "1.5\n");
    assert_eq!(eval("1e2"), "100\n");
    assert_eq!(eval("\"str\""), "\"str\"\n");
    assert_eq!(eval("'str'"), "\"str\"\n");
    assert_eq!(eval("@'a''b'"), "\"a'b\"\n");
    assert_eq!(eval("|||\n  text\n|||"), "\"text\\n\"\n");
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval("1 + 2 * 3"), "7\n");
    assert_eq!(eval("(1 + 2) * 3"), "9\n");
    assert_eq!(eval("10 / 4"), "2.5\n");
    assert_eq!(eval("7 % 3"), "1\n");
    assert_eq!(eval("-7 % 3"), "-1\n");
    assert_eq!(eval("2 - -3"), "5\n");
    assert!(eval_err("1 / 0").contains("division by zero"));
    assert!(eval_err("1 + \"x\" * 2").contains("does not operate on"));
}

#[test]
fn test_bitwise() {
    // Bitwise operators work in the 32-bit unsigned domain.
    assert_eq!(eval("5 & 3"), "1\n");
    assert_eq!(eval("5 | 3"), "7\n");
    assert_eq!(eval("5 ^ 3"), "6\n");
    assert_eq!(eval("1 << 4"), "16\n");
    assert_eq!(eval("256 >> 4"), "16\n");
    assert_eq!(eval("1 << 31"), "2147483648\n");
    assert_eq!(eval("~0"), "4294967295\n");
}

#[test]
fn test_string_ops() {
    assert_eq!(eval("\"a\" + \"b\""), "\"ab\"\n");
    assert_eq!(eval("\"n=\" + 1"), "\"n=1\"\n");
    assert_eq!(eval("1 + \"=n\""), "\"1=n\"\n");
    assert_eq!(eval("\"a\" + [1, 2]"), "\"a[1, 2]\"\n");
    assert_eq!(eval("\"abc\"[1]"), "\"b\"\n");
    // Indexing is per code point, not per byte.
    assert_eq!(eval("\"\\u03b1\\u03b2\"[1]"), "\"\u{3b2}\"\n");
    assert_eq!(eval("std.length(\"\\u03b1\\u03b2\")"), "2\n");
}

#[test]
fn test_logic() {
    assert_eq!(eval("true && false"), "false\n");
    assert_eq!(eval("false || true"), "true\n");
    assert_eq!(eval("!true"), "false\n");
    // Short circuit: the right side is not evaluated.
    assert_eq!(eval("false && error \"no\""), "false\n");
    assert_eq!(eval("true || error \"no\""), "true\n");
    assert!(eval_err("1 && true").contains("requires a boolean"));
}

#[test]
fn test_comparisons() {
    assert_eq!(eval("1 < 2"), "true\n");
    assert_eq!(eval("\"a\" < \"b\""), "true\n");
    assert_eq!(eval("[1, 2] < [1, 3]"), "true\n");
    assert_eq!(eval("[1] < [1, 0]"), "true\n");
    assert_eq!(eval("1 == 1.0"), "true\n");
    assert_eq!(eval("[1, [2]] == [1, [2]]"), "true\n");
    assert_eq!(eval("{a: 1} == {a: 1, b:: 2}"), "false\n");
    assert_eq!(eval("{a: 1} == {a: 1}"), "true\n");
    assert_eq!(eval("1 == \"1\""), "false\n");
    assert!(eval_err("true < false").contains("cannot compare"));
    assert!(eval_err("(function() 1) == (function() 1)")
        .contains("cannot test equality of functions"));
}

#[test]
fn test_if() {
    assert_eq!(eval("if 1 < 2 then \"y\" else \"n\""), "\"y\"\n");
    // No else branch means null.
    assert_eq!(eval("if false then 1"), "null\n");
    assert!(eval_err("if 1 then 2 else 3").contains("condition must be a boolean"));
}

#[test]
fn test_local_and_functions() {
    assert_eq!(eval("local x = 2; x * x"), "4\n");
    assert_eq!(eval("local add(a, b) = a + b; add(1, 2)"), "3\n");
    assert_eq!(eval("local f = function(x) x + 1; f(1)"), "2\n");
    // Mutually recursive locals.
    assert_eq!(
        eval("local even(n) = n == 0 || odd(n - 1), odd(n) = n != 0 && even(n - 1); even(10)"),
        "true\n",
    );
    // Named arguments and defaults.
    assert_eq!(eval("local f(a, b=2) = a + b; f(1)"), "3\n");
    assert_eq!(eval("local f(a, b=2) = a + b; f(1, b=10)"), "11\n");
    assert_eq!(eval("local f(a, b=2) = a + b; f(b=5, a=1)"), "6\n");
    // Defaults can reference earlier parameters.
    assert_eq!(eval("local f(x, y=x+1) = y; f(10)"), "11\n");
    assert!(eval_err("local f(a) = a; f()").contains("Missing argument: a"));
    assert!(eval_err("local f(a) = a; f(1, 2)").contains("too many arguments"));
    assert!(eval_err("local f(a) = a; f(1, a=2)").contains("duplicate argument: a"));
    assert!(eval_err("local f(a) = a; f(b=1)").contains("no parameter b"));
}

#[test]
fn test_laziness() {
    assert_eq!(eval("{a: 1, b: error \"no\"}.a"), "1\n");
    assert_eq!(eval("[1, error \"no\"][0]"), "1\n");
    assert_eq!(eval("local unused = error \"no\"; 42"), "42\n");
    assert_eq!(eval("std.length([error \"no\"])"), "1\n");
}

#[test]
fn test_infinite_recursion() {
    assert!(eval_err("local x = x; x").contains("infinite recursion"));
    assert!(eval_err("local f(n) = f(n) + 1; f(1)").contains("max stack frames exceeded."));
}

#[test]
fn test_objects_basic() {
    assert_eq!(eval_flat("{}"), "{ }");
    assert_eq!(eval_flat("{a: 1, b: 2}"), "{ \"a\": 1, \"b\": 2 }");
    assert_eq!(eval_flat("{a: 1, b:: 2, c::: 3}"), "{ \"a\": 1, \"c\": 3 }");
    assert_eq!(eval_flat("{a: {b: 1}}"), "{ \"a\": { \"b\": 1 } }");
    assert_eq!(eval_flat("{[\"a\" + \"b\"]: 1}"), "{ \"ab\": 1 }");
    // A null computed name drops the field.
    assert_eq!(eval_flat("{[null]: 1}"), "{ }");
    assert_eq!(eval("{a: 1}.a"), "1\n");
    assert_eq!(eval("{a: 1}[\"a\"]"), "1\n");
    // Hidden fields are reachable even though they do not manifest.
    assert_eq!(eval("{a:: 41}.a + 1"), "42\n");
    assert!(eval_err("{a: 1}.b").contains("field does not exist: b"));
    assert!(eval_err("{a: 1, [\"a\"]: 2}").contains("duplicate field name"));
}

#[test]
fn test_field_keys_sorted() {
    assert_eq!(
        eval_flat("{b: 1, a: 2, \"0\": 3}"),
        "{ \"0\": 3, \"a\": 2, \"b\": 1 }",
    );
}

#[test]
fn test_methods_and_locals_in_objects() {
    assert_eq!(eval("{f(x):: x * 2}.f(21)"), "42\n");
    assert_eq!(eval("{local two = 2, a: two * 3}.a"), "6\n");
    // Object locals see self.
    assert_eq!(eval("{local me = self, a: 1, b: me.a + 1}.b"), "2\n");
}

#[test]
fn test_self_and_dollar() {
    assert_eq!(eval("{a: 1, b: self.a + 1}.b"), "2\n");
    assert_eq!(eval("{a: 1, b: {c: $.a}}.b.c"), "1\n");
    // self refers to the object the lookup entered, not the definition
    // site.
    assert_eq!(eval("({a: 1, b: self.a} + {a: 2}).b"), "2\n");
}

#[test]
fn test_inheritance() {
    assert_eq!(eval_flat("{a: 1} + {b: 2}"), "{ \"a\": 1, \"b\": 2 }");
    assert_eq!(eval_flat("{a: 1} + {a: 2}"), "{ \"a\": 2 }");
    assert_eq!(eval_flat("{a: 1} + {a+: 2}"), "{ \"a\": 3 }");
    assert_eq!(eval_flat("{a:: 1} + {a::: 2}"), "{ \"a\": 2 }");
    assert_eq!(eval_flat("{a: 1} + {a:: 2}"), "{ }");
    assert_eq!(eval_flat("{a::: 1} + {a: 2}"), "{ \"a\": 2 }");
    // Plus fields merge nested objects.
    assert_eq!(
        eval_flat("{a: {x: 1}} + {a+: {y: 2}}"),
        "{ \"a\": { \"x\": 1, \"y\": 2 } }",
    );
    // A plus field without a base behaves like a plain field.
    assert_eq!(eval_flat("{a+: 2}"), "{ \"a\": 2 }");
    // Right-most definition wins across longer chains.
    assert_eq!(eval_flat("{a: 1} + {a: 2} + {a+: 10}"), "{ \"a\": 12 }");
    // Object extension sugar.
    assert_eq!(eval_flat("{a: 1} {b: 2}"), "{ \"a\": 1, \"b\": 2 }");
}

#[test]
fn test_super() {
    assert_eq!(eval("({a: 1} + {b: super.a}).b"), "1\n");
    assert_eq!(eval("({a: 1} + {a: super.a + 10}).a"), "11\n");
    assert_eq!(eval("({a: 1} + {b: super[\"a\"]}).b"), "1\n");
    assert_eq!(eval("({a: 1} + {has: \"a\" in super}).has"), "true\n");
    assert_eq!(eval("({a: 1} + {has: \"b\" in super}).has"), "false\n");
    // super skips the defining layer but keeps dynamic self.
    assert_eq!(
        eval("({a: 1, c: self.a} + {a: 2, b: super.c}).b"),
        "2\n",
    );
    assert!(eval_err("({} + {a: super.a}).a").contains("field does not exist: a"));
}

#[test]
fn test_in_operator() {
    assert_eq!(eval("\"a\" in {a: 1}"), "true\n");
    assert_eq!(eval("\"a\" in {a:: 1}"), "true\n");
    assert_eq!(eval("\"b\" in {a: 1}"), "false\n");
}

#[test]
fn test_array_ops() {
    assert_eq!(eval_flat("[1, 2] + [3]"), "[ 1, 2, 3 ]");
    assert_eq!(eval("[1, 2, 3][1]"), "2\n");
    assert_eq!(eval_flat("[1, 2, 3, 4][1:3]"), "[ 2, 3 ]");
    assert_eq!(eval_flat("[1, 2, 3, 4][::2]"), "[ 1, 3 ]");
    assert_eq!(eval_flat("[1, 2, 3, 4][2:]"), "[ 3, 4 ]");
    assert_eq!(eval("\"abcdef\"[1:5:2]"), "\"bd\"\n");
    assert!(eval_err("[1][5]").contains("out of bounds"));
    assert!(eval_err("[1][0.5]").contains("integer"));
}

#[test]
fn test_comprehensions() {
    assert_eq!(eval_flat("[x * x for x in std.range(1, 3)]"), "[ 1, 4, 9 ]");
    assert_eq!(
        eval_flat("[x for x in std.range(1, 10) if x % 3 == 0]"),
        "[ 3, 6, 9 ]",
    );
    assert_eq!(
        eval_flat("[[x, y] for x in [1, 2] for y in [\"a\"]]"),
        "[ [ 1, \"a\" ], [ 2, \"a\" ] ]",
    );
    assert_eq!(
        eval_flat("{[k]: 1 for k in [\"a\", \"b\"]}"),
        "{ \"a\": 1, \"b\": 1 }",
    );
    assert_eq!(
        eval_flat("{[k]: v for k in [\"a\"] for v in [2]}"),
        "{ \"a\": 2 }",
    );
    assert_eq!(
        eval_flat("{[x]: x for x in [\"a\", \"b\"] if x != \"b\"}"),
        "{ \"a\": \"a\" }",
    );
    // Comprehension objects still reject duplicate keys.
    assert!(eval_err("{[x]: 1 for x in [\"a\", \"a\"]}").contains("duplicate field name"));
    // The comprehension variable is visible in the field body.
    assert_eq!(
        eval_flat("{[k]: k + \"!\" for k in [\"a\"]}"),
        "{ \"a\": \"a!\" }",
    );
}

#[test]
fn test_object_comp_self() {
    // self inside a comprehension body sees the whole generated object.
    assert_eq!(
        eval_flat("{[k]: if k == \"a\" then 1 else self.a + 1 for k in [\"a\", \"b\"]}"),
        "{ \"a\": 1, \"b\": 2 }",
    );
}

#[test]
fn test_asserts() {
    assert_eq!(eval("assert 1 < 2; \"ok\""), "\"ok\"\n");
    assert!(eval_err("assert 1 > 2; \"ok\"").contains("Assertion failed"));
    assert!(eval_err("assert 1 > 2 : \"one is small\"; null").contains("one is small"));
    assert!(eval_err("{assert false, a: 1}").contains("Assertion failed"));
    assert!(eval_err("{assert self.a > 1 : \"a too small\", a: 1}").contains("a too small"));
    // Composite asserts see the final self.
    assert_eq!(eval_flat("{assert self.a > 1, a: 1} + {a: 2}"), "{ \"a\": 2 }");
    assert!(eval_err("{assert self.a > 1, a: 2} + {a: 1}").contains("Assertion failed"));
    // Asserts do not fire when the object is never manifested.
    assert_eq!(eval("local o = {assert false, a: 1}; 42"), "42\n");
}

#[test]
fn test_error_values() {
    assert!(eval_err("error \"boom\"").contains("RUNTIME ERROR: boom"));
    // Non-string error values are coerced via toString.
    assert!(eval_err("error {a: 1}").contains("{\"a\": 1}"));
    assert!(eval_err("error 42").contains("RUNTIME ERROR: 42"));
}

#[test]
fn test_text_block_and_interpolation_style() {
    assert_eq!(
        eval("|||\n  a: %d\n||| % 3"),
        "\"a: 3\\n\"\n",
    );
    assert_eq!(eval("\"x is %s\" % \"y\""), "\"x is y\"\n");
    assert_eq!(eval("\"%d-%d\" % [1, 2]"), "\"1-2\"\n");
}

#[test]
fn test_manifestation_determinism() {
    let input = "{b: [1, {c:: 2}], a: \"x\", d: {e: 1.5}}";
    assert_eq!(eval(input), eval(input));
}

#[test]
fn test_number_round_trip() {
    assert_eq!(
        eval("std.all([std.parseJson(std.toString(x)) == x for x in [0, 1, -1, 1.5, 0.1, 123456789.25, 1e10]])"),
        "true\n",
    );
}

#[test]
fn test_equality_reflexivity() {
    assert_eq!(
        eval("local v = {a: [1, \"x\", null, true, {b: 2.5}]}; v == v"),
        "true\n",
    );
    // NaN cannot be produced by literals; 0/0 is an error instead.
    assert!(eval_err("0 / 0").contains("division by zero"));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let deep = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
    let mut vm = Vm::new();
    let err = vm.evaluate_snippet("deep.jsonnet", &deep).unwrap_err();
    assert!(err.to_string().contains("nesting depth"));
}
