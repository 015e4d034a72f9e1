#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

//! Standard library surface tests.

use nujsonnet_lang::vm::Vm;

#[track_caller]
fn eval(input: &str) -> String {
    let mut vm = Vm::new();
    let mut output = vm.evaluate_snippet("std_test.jsonnet", input).unwrap();
    assert_eq!(output.pop(), Some('\n'));
    output
}

#[track_caller]
fn eval_err(input: &str) -> String {
    let mut vm = Vm::new();
    vm.evaluate_snippet("std_test.jsonnet", input)
        .unwrap_err()
        .to_string()
}

#[test]
fn test_type_tests() {
    assert_eq!(eval("std.type(null)"), "\"null\"");
    assert_eq!(eval("std.type(true)"), "\"boolean\"");
    assert_eq!(eval("std.type(1)"), "\"number\"");
    assert_eq!(eval("std.type(\"\")"), "\"string\"");
    assert_eq!(eval("std.type([])"), "\"array\"");
    assert_eq!(eval("std.type({})"), "\"object\"");
    assert_eq!(eval("std.type(function() 0)"), "\"function\"");
    assert_eq!(eval("std.isString(\"\")"), "true");
    assert_eq!(eval("std.isNumber(true)"), "false");
    assert_eq!(eval("std.isBoolean(false)"), "true");
    assert_eq!(eval("std.isArray([])"), "true");
    assert_eq!(eval("std.isObject({})"), "true");
    assert_eq!(eval("std.isFunction(std.length)"), "true");
}

#[test]
fn test_length() {
    assert_eq!(eval("std.length(\"abc\")"), "3");
    assert_eq!(eval("std.length([1, 2])"), "2");
    assert_eq!(eval("std.length({a: 1, b:: 2})"), "1");
    assert_eq!(eval("std.length(function(a, b) 0)"), "2");
    assert!(eval_err("std.length(1)").contains("argument \"x\" must be"));
}

#[test]
fn test_string_functions() {
    assert_eq!(eval("std.codepoint(\"A\")"), "65");
    assert_eq!(eval("std.char(104)"), "\"h\"");
    assert_eq!(eval("std.substr(\"hello\", 1, 3)"), "\"ell\"");
    assert_eq!(eval("std.findSubstr(\"aa\", \"aaaa\")"), "[\n   0,\n   1,\n   2\n]");
    assert_eq!(eval("std.startsWith(\"hello\", \"he\")"), "true");
    assert_eq!(eval("std.endsWith(\"hello\", \"lo\")"), "true");
    assert_eq!(eval("std.asciiUpper(\"aBc1\")"), "\"ABC1\"");
    assert_eq!(eval("std.asciiLower(\"aBc1\")"), "\"abc1\"");
    assert_eq!(
        eval("std.stringChars(\"ab\")"),
        "[\n   \"a\",\n   \"b\"\n]",
    );
    assert_eq!(eval("std.strReplace(\"a-b-c\", \"-\", \"+\")"), "\"a+b+c\"");
    assert_eq!(
        eval("std.split(\"a,b,,c\", \",\")"),
        "[\n   \"a\",\n   \"b\",\n   \"\",\n   \"c\"\n]",
    );
    assert_eq!(
        eval("std.splitLimit(\"a,b,c\", \",\", 1)"),
        "[\n   \"a\",\n   \"b,c\"\n]",
    );
    assert_eq!(
        eval("std.splitLimitR(\"a,b,c\", \",\", 1)"),
        "[\n   \"a,b\",\n   \"c\"\n]",
    );
    assert_eq!(eval("std.stripChars(\"  hi  \", \" \")"), "\"hi\"");
    assert_eq!(eval("std.lstripChars(\"xxhi\", \"x\")"), "\"hi\"");
    assert_eq!(eval("std.rstripChars(\"hixx\", \"x\")"), "\"hi\"");
    assert_eq!(eval("std.trim(\" hi\\n\")"), "\"hi\"");
    assert_eq!(eval("std.toString(1.5)"), "\"1.5\"");
    assert_eq!(eval("std.toString(\"s\")"), "\"s\"");
    assert_eq!(eval("std.toString({a: [1]})"), "\"{\\\"a\\\": [1]}\"");
}

#[test]
fn test_format() {
    assert_eq!(eval("std.format(\"%d apples\", [5])"), "\"5 apples\"");
    assert_eq!(eval("\"%d apples\" % 5"), "\"5 apples\"");
    assert_eq!(eval("\"%s=%s\" % [\"k\", 2]"), "\"k=2\"");
    assert_eq!(eval("\"%05.2f\" % 3.14159"), "\"03.14\"");
    assert_eq!(eval("\"%-6dx\" % 42"), "\"42    x\"");
    assert_eq!(eval("\"%+d\" % 42"), "\"+42\"");
    assert_eq!(eval("\"%x\" % 255"), "\"ff\"");
    assert_eq!(eval("\"%X\" % 255"), "\"FF\"");
    assert_eq!(eval("\"%#x\" % 255"), "\"0xff\"");
    assert_eq!(eval("\"%#o\" % 8"), "\"010\"");
    assert_eq!(eval("\"%e\" % 1500"), "\"1.500000e+03\"");
    assert_eq!(eval("\"%g\" % 1500"), "\"1500\"");
    assert_eq!(eval("\"%g\" % 0.0000015"), "\"1.5e-06\"");
    assert_eq!(eval("\"%c\" % 65"), "\"A\"");
    assert_eq!(eval("\"%%\" % []"), "\"%\"");
    assert_eq!(eval("\"%(name)s!\" % {name: \"x\"}"), "\"x!\"");
    assert_eq!(eval("\"%.3s\" % \"abcdef\""), "\"abc\"");
    assert!(eval_err("\"%d\" % 1.5").contains("integer"));
    assert!(eval_err("\"%d %d\" % [1]").contains("not enough values"));
    assert!(eval_err("\"%d\" % [1, 2]").contains("too many values"));
}

#[test]
fn test_escaping() {
    assert_eq!(
        eval("std.escapeStringJson(\"a\\nb\")"),
        "\"\\\"a\\\\nb\\\"\"",
    );
    assert_eq!(
        eval("std.escapeStringBash(\"don't\")"),
        "\"'don'\\\"'\\\"'t'\"",
    );
    assert_eq!(eval("std.escapeStringDollars(\"$a\")"), "\"$$a\"");
}

#[test]
fn test_parse_functions() {
    assert_eq!(eval("std.parseInt(\"-42\")"), "-42");
    assert_eq!(eval("std.parseOctal(\"755\")"), "493");
    assert_eq!(eval("std.parseHex(\"ff\")"), "255");
    assert_eq!(
        eval("std.parseJson('{\"a\": [1, true]}')"),
        "{\n   \"a\": [\n      1,\n      true\n   ]\n}",
    );
    assert_eq!(
        eval("std.parseYaml(\"a: 1\\nb:\\n- x\\n\")"),
        "{\n   \"a\": 1,\n   \"b\": [\n      \"x\"\n   ]\n}",
    );
    assert!(eval_err("std.parseInt(\"abc\")").contains("not a base 10 integer"));
    assert!(eval_err("std.parseJson(\"{\")").contains("failed to parse JSON"));
}

#[test]
fn test_encoding() {
    assert_eq!(eval("std.encodeUTF8(\"h\\u00e9\")"), "[\n   104,\n   195,\n   169\n]");
    assert_eq!(eval("std.decodeUTF8([104, 105])"), "\"hi\"");
    assert_eq!(eval("std.base64(\"hello\")"), "\"aGVsbG8=\"");
    assert_eq!(eval("std.base64([104, 105])"), "\"aGk=\"");
    assert_eq!(eval("std.base64Decode(\"aGVsbG8=\")"), "\"hello\"");
    assert_eq!(
        eval("std.base64DecodeBytes(\"aGk=\")"),
        "[\n   104,\n   105\n]",
    );
    assert_eq!(eval("std.md5(\"\")"), "\"d41d8cd98f00b204e9800998ecf8427e\"");
    assert_eq!(
        eval("std.sha1(\"\")"),
        "\"da39a3ee5e6b4b0d3255bfef95601890afd80709\"",
    );
    assert_eq!(
        eval("std.sha256(\"\")"),
        "\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\"",
    );
    assert_eq!(eval("std.length(std.sha512(\"\"))"), "128");
}

#[test]
fn test_math() {
    assert_eq!(eval("std.pow(2, 10)"), "1024");
    assert_eq!(eval("std.exp(0)"), "1");
    assert_eq!(eval("std.log(1)"), "0");
    assert_eq!(eval("std.sqrt(16)"), "4");
    assert_eq!(eval("std.floor(1.9)"), "1");
    assert_eq!(eval("std.ceil(1.1)"), "2");
    assert_eq!(eval("std.round(1.5)"), "2");
    assert_eq!(eval("std.abs(-3)"), "3");
    assert_eq!(eval("std.sign(-3)"), "-1");
    assert_eq!(eval("std.max(1, 2)"), "2");
    assert_eq!(eval("std.min(1, 2)"), "1");
    assert_eq!(eval("std.clamp(5, 0, 3)"), "3");
    assert_eq!(eval("std.mod(7, 3)"), "1");
    assert_eq!(eval("std.modulo(7, 3)"), "1");
    assert_eq!(eval("std.exponent(8)"), "4");
    assert_eq!(eval("std.mantissa(8)"), "0.5");
    assert_eq!(eval("std.isInteger(2)"), "true");
    assert_eq!(eval("std.isDecimal(2.5)"), "true");
    assert_eq!(eval("std.isEven(4)"), "true");
    assert_eq!(eval("std.isOdd(-3)"), "true");
    assert_eq!(eval("std.sin(0)"), "0");
    assert_eq!(eval("std.cos(0)"), "1");
    assert_eq!(eval("std.atan2(0, 1)"), "0");
    assert_eq!(eval("std.hypot(3, 4)"), "5");
    assert_eq!(eval("std.log2(8)"), "3");
    assert_eq!(eval("std.abs(std.deg2rad(180) - std.pi) < 1e-12"), "true");
    assert_eq!(eval("std.abs(std.rad2deg(std.pi) - 180) < 1e-12"), "true");
}

#[test]
fn test_array_functions() {
    assert_eq!(eval("std.makeArray(3, function(i) i * 2)"), "[\n   0,\n   2,\n   4\n]");
    assert_eq!(eval("std.range(2, 4)"), "[\n   2,\n   3,\n   4\n]");
    assert_eq!(eval("std.range(2, 1)"), "[ ]");
    assert_eq!(
        eval("std.map(function(x) x + 1, [1, 2])"),
        "[\n   2,\n   3\n]",
    );
    assert_eq!(
        eval("std.filter(function(x) x > 1, [1, 2, 3])"),
        "[\n   2,\n   3\n]",
    );
    assert_eq!(
        eval("std.flatMap(function(x) [x, x], [1, 2])"),
        "[\n   1,\n   1,\n   2,\n   2\n]",
    );
    assert_eq!(eval("std.flatMap(function(c) c + c, \"ab\")"), "\"aabb\"");
    assert_eq!(eval("std.foldl(function(a, b) a + b, [1, 2, 3], 10)"), "16");
    assert_eq!(
        eval("std.foldr(function(a, b) b + [a], [1, 2], [])"),
        "[\n   2,\n   1\n]",
    );
    assert_eq!(eval("std.join(\"-\", [\"a\", null, \"b\"])"), "\"a-b\"");
    assert_eq!(
        eval("std.join([0], [[1], [2]])"),
        "[\n   1,\n   0,\n   2\n]",
    );
    assert_eq!(eval("std.lines([\"a\", \"b\"])"), "\"a\\nb\\n\"");
    assert_eq!(eval("std.reverse([1, 2, 3])"), "[\n   3,\n   2,\n   1\n]");
    assert_eq!(eval("std.member([1, 2], 2)"), "true");
    assert_eq!(eval("std.member(\"abc\", \"bc\")"), "true");
    assert_eq!(eval("std.count([1, 2, 1], 1)"), "2");
    assert_eq!(eval("std.find(2, [1, 2, 1, 2])"), "[\n   1,\n   3\n]");
    assert_eq!(eval("std.sum([1, 2, 3])"), "6");
    assert_eq!(eval("std.avg([1, 2, 3])"), "2");
    assert_eq!(eval("std.all([true, true])"), "true");
    assert_eq!(eval("std.any([false, true])"), "true");
    assert_eq!(eval("std.contains([1, 2], 2)"), "true");
    assert_eq!(eval("std.repeat(\"ab\", 2)"), "\"abab\"");
    assert_eq!(eval("std.repeat([1], 3)"), "[\n   1,\n   1,\n   1\n]");
    assert_eq!(
        eval("std.flattenArrays([[1], [2, 3]])"),
        "[\n   1,\n   2,\n   3\n]",
    );
    assert_eq!(
        eval("std.mapWithIndex(function(i, x) [i, x], [\"a\"])"),
        "[\n   [\n      0,\n      \"a\"\n   ]\n]",
    );
    assert_eq!(
        eval("std.filterMap(function(x) x > 1, function(x) x * 10, [1, 2])"),
        "[\n   20\n]",
    );
    assert_eq!(eval("std.minArray([3, 1, 2])"), "1");
    assert_eq!(eval("std.maxArray([3, 1, 2])"), "3");
    assert_eq!(eval("std.slice([1, 2, 3, 4], 1, 3, 1)"), "[\n   2,\n   3\n]");
}

#[test]
fn test_sort_and_sets() {
    assert_eq!(eval("std.sort([3, 1, 2])"), "[\n   1,\n   2,\n   3\n]");
    assert_eq!(
        eval("std.sort([\"b\", \"a\"])"),
        "[\n   \"a\",\n   \"b\"\n]",
    );
    assert_eq!(
        eval("std.sort([{k: 2, v: \"x\"}, {k: 1, v: \"y\"}], keyF=function(o) o.k)[0].v"),
        "\"y\"",
    );
    // Sorting is stable.
    assert_eq!(
        eval("std.map(function(o) o.v, std.sort([{k: 1, v: 1}, {k: 1, v: 2}], function(o) o.k))"),
        "[\n   1,\n   2\n]",
    );
    assert_eq!(eval("std.uniq([1, 1, 2, 2, 2, 3])"), "[\n   1,\n   2,\n   3\n]");
    assert_eq!(eval("std.set([3, 1, 3, 2])"), "[\n   1,\n   2,\n   3\n]");
    assert_eq!(eval("std.setMember(2, [1, 2, 3])"), "true");
    assert_eq!(eval("std.setUnion([1, 2], [2, 3])"), "[\n   1,\n   2,\n   3\n]");
    assert_eq!(eval("std.setInter([1, 2], [2, 3])"), "[\n   2\n]");
    assert_eq!(eval("std.setDiff([1, 2], [2, 3])"), "[\n   1\n]");
    assert!(eval_err("std.sort([1, \"a\"])").contains("cannot compare"));
}

#[test]
fn test_object_functions() {
    assert_eq!(
        eval("std.objectFields({b: 1, a: 2, c:: 3})"),
        "[\n   \"a\",\n   \"b\"\n]",
    );
    assert_eq!(
        eval("std.objectFieldsAll({b: 1, c:: 3})"),
        "[\n   \"b\",\n   \"c\"\n]",
    );
    assert_eq!(eval("std.objectHas({a: 1}, \"a\")"), "true");
    assert_eq!(eval("std.objectHas({a:: 1}, \"a\")"), "false");
    assert_eq!(eval("std.objectHasAll({a:: 1}, \"a\")"), "true");
    assert_eq!(eval("std.objectValues({a: 1, b: 2})"), "[\n   1,\n   2\n]");
    assert_eq!(
        eval("std.objectKeysValues({a: 1})"),
        "[\n   {\n      \"key\": \"a\",\n      \"value\": 1\n   }\n]",
    );
    assert_eq!(
        eval("std.objectRemoveKey({a: 1, b: 2}, \"a\")"),
        "{\n   \"b\": 2\n}",
    );
    assert_eq!(eval("std.get({a: 1}, \"a\")"), "1");
    assert_eq!(eval("std.get({a: 1}, \"b\", 42)"), "42");
    assert_eq!(eval("std.get({a:: 1}, \"a\")"), "1");
    assert_eq!(
        eval("std.mapWithKey(function(k, v) k + v, {a: \"x\"})"),
        "{\n   \"a\": \"ax\"\n}",
    );
}

#[test]
fn test_prune_and_merge_patch() {
    assert_eq!(
        eval("std.prune({a: null, b: [], c: {}, d: 0, e: [null]})"),
        "{\n   \"d\": 0\n}",
    );
    assert_eq!(
        eval("std.mergePatch({a: 1, b: 2}, {b: null, c: 3})"),
        "{\n   \"a\": 1,\n   \"c\": 3\n}",
    );
    assert_eq!(
        eval("std.mergePatch({a: {x: 1}}, {a: {y: 2}})"),
        "{\n   \"a\": {\n      \"x\": 1,\n      \"y\": 2\n   }\n}",
    );
    assert_eq!(eval("std.mergePatch({a: 1}, \"s\")"), "\"s\"");
}

#[test]
fn test_manifest_functions() {
    assert_eq!(
        eval("std.manifestJsonEx({a: [1]}, \"  \")"),
        "\"{\\n  \\\"a\\\": [\\n    1\\n  ]\\n}\"",
    );
    assert_eq!(
        eval("std.manifestJsonMinified({a: [1, 2]})"),
        "\"{\\\"a\\\":[1,2]}\"",
    );
    assert_eq!(
        eval("std.manifestYamlDoc({a: 1, b: [true]})"),
        "\"\\\"a\\\": 1\\n\\\"b\\\":\\n- true\"",
    );
    assert_eq!(
        eval("std.manifestYamlDoc({b: [1]}, indent_array_in_object=true, quote_keys=false)"),
        "\"b:\\n  - 1\"",
    );
    assert_eq!(
        eval("std.manifestYamlStream([1, 2])"),
        "\"---\\n1\\n---\\n2\\n...\\n\"",
    );
    assert_eq!(
        eval("std.manifestIni({sections: {s: {a: 1}}})"),
        "\"[s]\\na = 1\\n\"",
    );
    assert_eq!(
        eval("std.manifestIni({main: {x: [1, 2]}, sections: {}})"),
        "\"x = 1\\nx = 2\\n\"",
    );
    assert_eq!(
        eval("std.manifestPython({a: [1, true, null]})"),
        "\"{\\\"a\\\": [1, True, None]}\"",
    );
    assert_eq!(
        eval("std.manifestPythonVars({x: 1})"),
        "\"x = 1\\n\"",
    );
}

#[test]
fn test_misc() {
    assert_eq!(eval("std.assertEqual(1, 1)"), "true");
    assert!(eval_err("std.assertEqual(1, 2)").contains("Assertion failed"));
    assert_eq!(eval("std.primitiveEquals(1, 1)"), "true");
    assert_eq!(eval("std.primitiveEquals(1, \"1\")"), "false");
    assert_eq!(eval("std.equals([1], [1])"), "true");
    assert_eq!(eval("std.xor(true, false)"), "true");
    assert_eq!(eval("std.xnor(true, false)"), "false");
    assert_eq!(eval("std.isEmpty(\"\")"), "true");
    // Unknown native functions evaluate to null without error.
    assert_eq!(eval("std.native(\"nope\")"), "null");
}
