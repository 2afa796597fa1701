//! Seeded generator of random flat programs for property tests
#![allow(dead_code)]

use ember_compiler::ir::{
    BinaryOp, BodyBuilder, ExprId, FunctionId, Program, ProgramBuilder, StmtId, Type, VarId,
};
use ember_compiler::{Interpreter, RuntimeError, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of array elements the generator ever touches
pub const ARRAY_SPAN: i64 = 4;

struct Gen<'p> {
    rng: StdRng,
    f: BodyBuilder<'p>,
    locals: Vec<VarId>,
    global: VarId,
    array: VarId,
    print: FunctionId,
    counters: usize,
}

impl Gen<'_> {
    fn local(&mut self) -> VarId {
        self.locals[self.rng.gen_range(0..self.locals.len())]
    }

    fn expr(&mut self, depth: u32) -> ExprId {
        let choice = if depth == 0 {
            self.rng.gen_range(0..4)
        } else {
            self.rng.gen_range(0..8)
        };
        match choice {
            0 => {
                let v = self.rng.gen_range(-3..10);
                self.f.int(v)
            }
            1 | 2 => {
                let v = self.local();
                self.f.read(v)
            }
            3 => {
                if self.rng.gen_bool(0.5) {
                    self.f.read(self.global)
                } else if depth > 0 && self.rng.gen_bool(0.3) {
                    // May go negative and fail at runtime
                    let base = self.expr(depth - 1);
                    let offset = self.f.int(self.rng.gen_range(0..3));
                    let index = self.f.binary(BinaryOp::Sub, base, offset);
                    self.f.array_read(self.array, index)
                } else {
                    let index = self.f.int(self.rng.gen_range(0..ARRAY_SPAN));
                    self.f.array_read(self.array, index)
                }
            }
            4 | 5 => {
                let op = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul][self.rng.gen_range(0..3)];
                let lhs = self.expr(depth - 1);
                let rhs = self.expr(depth - 1);
                self.f.binary(op, lhs, rhs)
            }
            6 => {
                let op = if self.rng.gen_bool(0.5) {
                    BinaryOp::Div
                } else {
                    BinaryOp::Mod
                };
                let lhs = self.expr(depth - 1);
                let rhs = self.f.int(self.rng.gen_range(1..5));
                self.f.binary(op, lhs, rhs)
            }
            _ => {
                let v = self.local();
                let init = self.expr(depth - 1);
                let bound = self.f.read(v);
                let rest = self.expr(depth - 1);
                let body = self.f.binary(BinaryOp::Add, bound, rest);
                self.f.let_in(v, init, body)
            }
        }
    }

    fn cond(&mut self, depth: u32) -> ExprId {
        if depth > 0 && self.rng.gen_bool(0.3) {
            let op = if self.rng.gen_bool(0.5) {
                BinaryOp::And
            } else {
                BinaryOp::Or
            };
            let lhs = self.cond(depth - 1);
            let rhs = self.cond(depth - 1);
            return self.f.binary(op, lhs, rhs);
        }
        let op = [
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ][self.rng.gen_range(0..6)];
        let lhs = self.expr(depth.min(2));
        let rhs = self.expr(depth.min(1));
        self.f.binary(op, lhs, rhs)
    }

    fn block(&mut self, depth: u32, in_loop: bool) -> Vec<StmtId> {
        let n = self.rng.gen_range(1..5);
        let mut stmts = Vec::new();
        for _ in 0..n {
            stmts.extend(self.stmt(depth, in_loop));
        }
        stmts
    }

    fn stmt(&mut self, depth: u32, in_loop: bool) -> Vec<StmtId> {
        let upper = if depth == 0 { 5 } else { 9 };
        match self.rng.gen_range(0..upper) {
            0 | 1 => {
                let target = self.local();
                let value = self.expr(2);
                vec![self.f.assign(target, value)]
            }
            2 => {
                let value = self.expr(2);
                vec![self.f.assign(self.global, value)]
            }
            3 => {
                let index = self.f.int(self.rng.gen_range(0..ARRAY_SPAN));
                let value = self.expr(2);
                vec![self.f.array_assign(self.array, index, value)]
            }
            4 => {
                let arg = self.expr(2);
                let call = self.f.call(self.print, vec![arg]);
                vec![self.f.expr_stmt(call)]
            }
            5 | 6 => {
                let cond = self.cond(2);
                let then_block = self.block(depth - 1, in_loop);
                let else_block = if self.rng.gen_bool(0.5) {
                    self.block(depth - 1, in_loop)
                } else {
                    Vec::new()
                };
                vec![self.f.if_else(cond, then_block, else_block)]
            }
            7 => self.bounded_loop(depth),
            _ => {
                if in_loop {
                    let cond = self.cond(1);
                    vec![self.f.exit_when(cond)]
                } else {
                    let cond = self.cond(1);
                    let value = self.expr(1);
                    let ret = self.f.ret(Some(value));
                    vec![self.f.if_else(cond, vec![ret], Vec::new())]
                }
            }
        }
    }

    /// `c = 0; loop { exitwhen c >= k; ...; c = c + 1 }` with a counter
    /// nothing else writes
    fn bounded_loop(&mut self, depth: u32) -> Vec<StmtId> {
        let counter = self.f.local(&format!("c{}", self.counters), Type::Int);
        self.counters += 1;
        let zero = self.f.int(0);
        let init = self.f.assign(counter, zero);

        let read = self.f.read(counter);
        let bound = self.f.int(self.rng.gen_range(1..4));
        let done = self.f.binary(BinaryOp::Ge, read, bound);
        let exit = self.f.exit_when(done);
        let mut body = vec![exit];
        body.extend(self.block(depth - 1, true));
        let read = self.f.read(counter);
        let one = self.f.int(1);
        let next = self.f.binary(BinaryOp::Add, read, one);
        body.push(self.f.assign(counter, next));
        vec![init, self.f.loop_(body)]
    }
}

/// Random flat program with `main() -> int`, a global `g`, a global array
/// `arr` and calls to the native `print`. Every loop is bounded.
pub fn random_program(seed: u64) -> Program {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pb = ProgramBuilder::new();
    let global = pb.global("g", Type::Int);
    let array = pb.global("arr", Type::array_of(Type::Int));
    let print = pb.native("print", vec![Type::Int], Type::Void);

    let mut f = pb.function("main", Type::Int);
    let count = rng.gen_range(2..7);
    let locals: Vec<VarId> = (0..count).map(|i| f.local(&format!("v{}", i), Type::Int)).collect();
    let mut generator = Gen {
        rng,
        f,
        locals: locals.clone(),
        global,
        array,
        print,
        counters: 0,
    };
    let stmts = generator.block(3, false);
    let mut f = generator.f;
    for stmt in stmts {
        f.push(stmt);
    }
    for v in &locals {
        let read = f.read(*v);
        let call = f.call(print, vec![read]);
        let stmt = f.expr_stmt(call);
        f.push(stmt);
    }
    let read = f.read(locals[0]);
    let ret = f.ret(Some(read));
    f.push(ret);
    f.finish();
    pb.finish()
}

/// Everything a caller can observe about running `main`
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub result: Result<Value, RuntimeError>,
    pub output: Vec<String>,
    pub global: Value,
    pub array: Vec<Value>,
}

pub fn observe(program: &Program) -> Observation {
    let mut interp = Interpreter::new(program).with_step_limit(1_000_000);
    let result = interp.call("main", Vec::new());
    let global = program
        .global_id("g")
        .map(|g| interp.global(g))
        .unwrap_or(Value::Void);
    let array = match program.global_id("arr") {
        Some(arr) => (0..ARRAY_SPAN).map(|i| interp.array_element(arr, i)).collect(),
        None => Vec::new(),
    };
    Observation {
        result,
        output: interp.output().to_vec(),
        global,
        array,
    }
}
