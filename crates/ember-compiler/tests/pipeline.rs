//! End-to-end tests: OO program in, flat program out, then executed

use ember_compiler::ir::{ClassId, PrettyPrint, Program, ProgramBuilder, Type};
use ember_compiler::{
    CompileError, Compiler, CompilerConfig, Interpreter, OptLevel, RuntimeError, Value,
};

/// `B.foo` doubles `x`; `A extends B` overrides it with `x = x + 1; super.foo()`.
/// `main` builds an `A` behind a `B`-typed local, sets `x = 2` and calls `foo`.
fn doubling_scenario() -> Program {
    let mut pb = ProgramBuilder::new();
    let b = pb.class("B");
    let a = pb.class("A");
    pb.extends(a, b);
    let x = pb.field(b, "x", Type::Int);

    let mut f = pb.function("B_foo", Type::Void);
    let this = f.param("this", Type::Class(b));
    let recv = f.read(this);
    let old = f.member_read(recv, x);
    let two = f.int(2);
    let doubled = f.binary(ember_compiler::ir::BinaryOp::Mul, old, two);
    let recv = f.read(this);
    let store = f.member_assign(recv, x, doubled);
    f.push(store);
    let b_foo = f.finish();

    let mut f = pb.function("A_foo", Type::Void);
    let this = f.param("this", Type::Class(a));
    let recv = f.read(this);
    let old = f.member_read(recv, x);
    let one = f.int(1);
    let inc = f.binary(ember_compiler::ir::BinaryOp::Add, old, one);
    let recv = f.read(this);
    let store = f.member_assign(recv, x, inc);
    f.push(store);
    let recv = f.read(this);
    let sup = f.call(b_foo, vec![recv]);
    let stmt = f.expr_stmt(sup);
    f.push(stmt);
    let a_foo = f.finish();

    let foo = pb.method(b, "foo", Vec::new(), Type::Void, Some(b_foo));
    pb.override_method(foo, a, Some(a_foo));

    let mut f = pb.function("main", Type::Int);
    let o = f.local("o", Type::Class(b));
    let new = f.alloc(a);
    let init = f.assign(o, new);
    f.push(init);
    let recv = f.read(o);
    let two = f.int(2);
    let set = f.member_assign(recv, x, two);
    f.push(set);
    let recv = f.read(o);
    let call = f.method_call(foo, recv, Vec::new());
    let stmt = f.expr_stmt(call);
    f.push(stmt);
    let recv = f.read(o);
    let get = f.member_read(recv, x);
    let ret = f.ret(Some(get));
    f.push(ret);
    f.finish();

    pb.finish()
}

fn config(level: OptLevel) -> CompilerConfig {
    let mut config = CompilerConfig::default();
    config.optimize.level = level;
    config
}

#[test]
fn test_override_calling_super_doubles_after_increment() {
    for level in [OptLevel::None, OptLevel::Basic, OptLevel::Full] {
        let flat = Compiler::new(config(level)).compile(doubling_scenario()).unwrap();
        assert!(flat.is_flat());
        assert!(flat.classes.is_empty() && flat.methods.is_empty());
        let result = Interpreter::new(&flat).call("main", Vec::new()).unwrap();
        assert_eq!(result, Value::Int(6), "{:?}", level);
    }
}

#[test]
fn test_compile_reports_stats() {
    let compiler = Compiler::new(config(OptLevel::Full));
    let (flat, stats) = compiler.compile_with_stats(doubling_scenario()).unwrap();
    assert_eq!(stats.elimination.classes, 2);
    assert_eq!(stats.elimination.field_pools, 1);
    assert_eq!(stats.elimination.dispatch_functions, 1);
    assert_eq!(stats.elimination.method_calls, 1);
    assert!(flat.global_id("B_x").is_some());
    assert!(flat.global_id("typeId").is_some());
    assert!(flat.function_id("dispatch_B_foo").is_some());
}

#[test]
fn test_json_interchange_round_trip() {
    let program = doubling_scenario();
    let text = program.to_json().unwrap();
    let parsed = Program::from_json(&text).unwrap();
    assert_eq!(parsed, program);

    let flat = Compiler::default().compile(parsed).unwrap();
    let reparsed = Program::from_json(&flat.to_json().unwrap()).unwrap();
    assert_eq!(reparsed, flat);
    assert_eq!(
        Interpreter::new(&reparsed).call("main", Vec::new()).unwrap(),
        Value::Int(6)
    );
}

#[test]
fn test_pretty_output_is_class_free() {
    let flat = Compiler::default().compile(doubling_scenario()).unwrap();
    let text = flat.pretty_print();
    assert!(text.contains("fn main() -> int {"));
    assert!(text.contains("fn dispatch_B_foo("));
    assert!(!text.contains("class "));
}

/// `check_<X>_<Y>() { o: Shape = new X; return o instanceof Y }`
fn instanceof_probe(
    pb: &mut ProgramBuilder,
    shape: ClassId,
    (x, x_name): (ClassId, &str),
    (y, y_name): (ClassId, &str),
) {
    let mut f = pb.function(&format!("check_{}_{}", x_name, y_name), Type::Bool);
    let o = f.local("o", Type::Class(shape));
    let new = f.alloc(x);
    let init = f.assign(o, new);
    f.push(init);
    let recv = f.read(o);
    let test = f.instance_of(recv, y);
    let ret = f.ret(Some(test));
    f.push(ret);
    f.finish();
}

#[test]
fn test_instanceof_follows_extends_and_implements() {
    // Shape <- Circle <- Unit, Shape <- Square, Square implements Named
    let mut pb = ProgramBuilder::new();
    let shape = pb.abstract_class("Shape");
    let named = pb.abstract_class("Named");
    let circle = pb.class("Circle");
    let unit = pb.class("Unit");
    let square = pb.class("Square");
    pb.extends(circle, shape);
    pb.extends(unit, circle);
    pb.extends(square, shape);
    pb.implements(square, named);

    let concrete = [(circle, "Circle"), (unit, "Unit"), (square, "Square")];
    let targets = [
        (shape, "Shape"),
        (named, "Named"),
        (circle, "Circle"),
        (unit, "Unit"),
        (square, "Square"),
    ];
    for x in concrete {
        for y in targets {
            instanceof_probe(&mut pb, shape, x, y);
        }
    }
    let program = pb.finish();

    let expected = |x: &str, y: &str| {
        matches!(
            (x, y),
            (_, "Shape")
                | ("Circle", "Circle")
                | ("Unit", "Circle")
                | ("Unit", "Unit")
                | ("Square", "Square")
                | ("Square", "Named")
        )
    };

    for threshold in [0, 1, 8] {
        let mut config = config(OptLevel::Full);
        config.lower.instanceof_cache_threshold = threshold;
        let flat = Compiler::new(config).compile(program.clone()).unwrap();
        for (_, x) in concrete {
            for (_, y) in targets {
                let got = Interpreter::new(&flat)
                    .call(&format!("check_{}_{}", x, y), Vec::new())
                    .unwrap();
                assert_eq!(
                    got,
                    Value::Bool(expected(x, y)),
                    "{} instanceof {} (threshold {})",
                    x,
                    y,
                    threshold
                );
            }
        }
    }
}

#[test]
fn test_cyclic_hierarchy_is_rejected() {
    let mut pb = ProgramBuilder::new();
    let a = pb.class("A");
    let b = pb.class("B");
    pb.extends(a, b);
    pb.extends(b, a);
    let err = Compiler::default().compile(pb.finish()).unwrap_err();
    assert!(matches!(err, CompileError::Structural { .. }), "{}", err);
}

#[test]
fn test_double_destroy_traps_at_runtime() {
    let mut pb = ProgramBuilder::new();
    let a = pb.class("A");
    let mut f = pb.function("main", Type::Void);
    let o = f.local("o", Type::Class(a));
    let new = f.alloc(a);
    let init = f.assign(o, new);
    f.push(init);
    for _ in 0..2 {
        let recv = f.read(o);
        let free = f.dealloc(a, recv);
        f.push(free);
    }
    f.finish();

    let flat = Compiler::default().compile(pb.finish()).unwrap();
    let err = Interpreter::new(&flat).call("main", Vec::new()).unwrap_err();
    assert_eq!(err, RuntimeError::Trap("double free of A".to_string()));
}
