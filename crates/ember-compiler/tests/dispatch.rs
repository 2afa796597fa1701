//! Typeid numbering and dynamic dispatch through the whole pipeline

use ember_compiler::hierarchy::{assign_type_ids, Hierarchy};
use ember_compiler::ir::{ClassId, FunctionId, MethodId, Program, ProgramBuilder, Type};
use ember_compiler::{Compiler, CompilerConfig, Interpreter, OptLevel, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `foo` implementation for `class` returning `value`
fn returning(pb: &mut ProgramBuilder, class: ClassId, name: &str, value: i64) -> FunctionId {
    let mut f = pb.function(name, Type::Int);
    f.param("this", Type::Class(class));
    let v = f.int(value);
    let ret = f.ret(Some(v));
    f.push(ret);
    f.finish()
}

/// `probe_<Class>() { o: Base = new Class; return o.foo() }`
fn probe(pb: &mut ProgramBuilder, base: ClassId, class: ClassId, name: &str, method: MethodId) {
    let mut f = pb.function(&format!("probe_{}", name), Type::Int);
    let o = f.local("o", Type::Class(base));
    let new = f.alloc(class);
    let init = f.assign(o, new);
    f.push(init);
    let recv = f.read(o);
    let call = f.method_call(method, recv, Vec::new());
    let ret = f.ret(Some(call));
    f.push(ret);
    f.finish();
}

fn run(program: &Program, entry: &str) -> Value {
    Interpreter::new(program).call(entry, Vec::new()).unwrap()
}

fn compile(program: Program, level: OptLevel) -> Program {
    let mut config = CompilerConfig::default();
    config.optimize.level = level;
    Compiler::new(config).compile(program).unwrap()
}

/// Class `i` extends a random earlier class, or starts a new tree
fn random_forest(rng: &mut StdRng, pb: &mut ProgramBuilder, n: usize) -> Vec<ClassId> {
    let mut classes = Vec::new();
    for i in 0..n {
        let class = pb.class(&format!("C{}", i));
        if i > 0 && rng.gen_bool(0.8) {
            let p = rng.gen_range(0..i);
            pb.extends(class, classes[p]);
        }
        classes.push(class);
    }
    classes
}

#[test]
fn test_typeid_ranges_partition_extends_subtrees() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pb = ProgramBuilder::new();
        let n = rng.gen_range(1..24);
        random_forest(&mut rng, &mut pb, n);
        let program = pb.finish();

        let table = assign_type_ids(&program).unwrap();
        let hierarchy = Hierarchy::new(&program).unwrap();
        assert_eq!(table.len(), n);

        let mut own: Vec<u32> = (0..n).map(|i| table.typeid(ClassId::new(i as u32))).collect();
        own.sort();
        assert_eq!(own, (0..n as u32).collect::<Vec<_>>(), "seed {}", seed);

        for c in 0..n {
            let c = ClassId::new(c as u32);
            let range = table.range(c);
            for d in 0..n {
                let d = ClassId::new(d as u32);
                let mut ancestor = Some(d);
                let mut below = false;
                while let Some(a) = ancestor {
                    if a == c {
                        below = true;
                        break;
                    }
                    ancestor = program.class(a).extends;
                }
                assert_eq!(
                    range.contains(table.typeid(d)),
                    below,
                    "seed {}: {} in range of {}",
                    seed,
                    d,
                    c
                );
            }
            for pair in hierarchy.extends_children(c).windows(2) {
                let (a, b) = (table.range(pair[0]), table.range(pair[1]));
                assert!(a.end < b.start || b.end < a.start);
            }
        }
    }
}

#[test]
fn test_four_level_chain_with_overrides() {
    // Root <- A <- B <- C, foo implemented at Root, B and C
    let mut pb = ProgramBuilder::new();
    let names = ["Root", "A", "B", "C"];
    let classes: Vec<ClassId> = names.iter().map(|n| pb.class(n)).collect();
    for pair in classes.windows(2) {
        pb.extends(pair[1], pair[0]);
    }
    let root_impl = returning(&mut pb, classes[0], "Root_foo", 0);
    let b_impl = returning(&mut pb, classes[2], "B_foo", 1);
    let c_impl = returning(&mut pb, classes[3], "C_foo", 2);
    let foo = pb.method(classes[0], "foo", Vec::new(), Type::Int, Some(root_impl));
    let b_foo = pb.override_method(foo, classes[2], Some(b_impl));
    pb.override_method(b_foo, classes[3], Some(c_impl));
    for (class, name) in classes.iter().zip(names) {
        probe(&mut pb, classes[0], *class, name, foo);
    }
    let program = pb.finish();

    for level in [OptLevel::None, OptLevel::Full] {
        let flat = compile(program.clone(), level);
        let got: Vec<Value> = names
            .iter()
            .map(|n| run(&flat, &format!("probe_{}", n)))
            .collect();
        assert_eq!(
            got,
            vec![Value::Int(0), Value::Int(0), Value::Int(1), Value::Int(2)],
            "{:?}",
            level
        );
    }
}

#[test]
fn test_random_hierarchies_dispatch_to_nearest_override() {
    for seed in 0..12u64 {
        let mut rng = StdRng::seed_from_u64(100 + seed);
        let mut pb = ProgramBuilder::new();
        let n = rng.gen_range(2..16);

        // A single tree under C0 so every class is a subclass of the owner
        let mut classes = vec![pb.class("C0")];
        let mut parent = vec![None];
        for i in 1..n {
            let class = pb.class(&format!("C{}", i));
            let p = rng.gen_range(0..i);
            pb.extends(class, classes[p]);
            classes.push(class);
            parent.push(Some(p));
        }

        let base_impl = returning(&mut pb, classes[0], "C0_foo", 0);
        let foo = pb.method(classes[0], "foo", Vec::new(), Type::Int, Some(base_impl));
        let mut overrides = vec![false; n];
        overrides[0] = true;
        for i in 1..n {
            if rng.gen_bool(0.4) {
                let imp = returning(&mut pb, classes[i], &format!("C{}_foo", i), i as i64);
                pb.override_method(foo, classes[i], Some(imp));
                overrides[i] = true;
            }
        }
        for (i, class) in classes.iter().enumerate() {
            probe(&mut pb, classes[0], *class, &format!("C{}", i), foo);
        }
        let flat = compile(pb.finish(), OptLevel::Full);

        for i in 0..n {
            let mut at = i;
            while !overrides[at] {
                at = parent[at].unwrap();
            }
            assert_eq!(
                run(&flat, &format!("probe_C{}", i)),
                Value::Int(at as i64),
                "seed {} class C{}",
                seed,
                i
            );
        }
    }
}

/// `main() { o: A = new A or null; [destroy o;] return o.foo() }`
fn call_foo_on(destroy_first: bool, null: bool) -> Program {
    let mut pb = ProgramBuilder::new();
    let a = pb.class("A");
    let imp = returning(&mut pb, a, "A_foo", 1);
    let foo = pb.method(a, "foo", Vec::new(), Type::Int, Some(imp));
    let mut f = pb.function("main", Type::Int);
    let o = f.local("o", Type::Class(a));
    let init = if null { f.null(Type::Class(a)) } else { f.alloc(a) };
    let init = f.assign(o, init);
    f.push(init);
    if destroy_first {
        let recv = f.read(o);
        let free = f.dealloc(a, recv);
        f.push(free);
    }
    let recv = f.read(o);
    let call = f.method_call(foo, recv, Vec::new());
    let ret = f.ret(Some(call));
    f.push(ret);
    f.finish();
    pb.finish()
}

#[test]
fn test_destroyed_receiver_traps() {
    for level in [OptLevel::None, OptLevel::Full] {
        let flat = compile(call_foo_on(true, false), level);
        let err = Interpreter::new(&flat).call("main", Vec::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("trap:"), "{}", message);
        assert!(message.contains("destroyed object"), "{}", message);
        assert!(!message.contains("null pointer"), "{}", message);
    }
}

#[test]
fn test_null_receiver_traps() {
    for level in [OptLevel::None, OptLevel::Full] {
        let flat = compile(call_foo_on(false, true), level);
        let err = Interpreter::new(&flat).call("main", Vec::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("trap:"), "{}", message);
        assert!(message.contains("null pointer"), "{}", message);
        assert!(!message.contains("destroyed object"), "{}", message);
    }
}

#[test]
fn test_live_receiver_dispatches() {
    let flat = compile(call_foo_on(false, false), OptLevel::Full);
    assert_eq!(run(&flat, "main"), Value::Int(1));
}
