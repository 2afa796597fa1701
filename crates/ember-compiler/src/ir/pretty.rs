//! Pretty-printing for IR
//!
//! Human-readable output for debugging, CLI listings and invariant-failure
//! dumps.

use super::body::Body;
use super::node::{ExprId, ExprKind, StmtId, StmtKind};
use super::program::{FunctionId, Program, VarId};

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for Program {
    fn pretty_print(&self) -> String {
        let mut out = String::new();

        for class in &self.classes {
            let mut header = format!("class {}", class.name);
            if class.is_abstract {
                header = format!("abstract {}", header);
            }
            if let Some(sup) = class.extends {
                header.push_str(&format!(" extends {}", self.class(sup).name));
            }
            if !class.implements.is_empty() {
                let names: Vec<&str> = class
                    .implements
                    .iter()
                    .map(|c| self.class(*c).name.as_str())
                    .collect();
                header.push_str(&format!(" implements {}", names.join(", ")));
            }
            out.push_str(&header);
            out.push_str(" {\n");
            for field in &class.fields {
                out.push_str(&format!("  field {}: {}\n", field.name, self.type_name(&field.ty)));
            }
            for m in &class.methods {
                let method = self.method(*m);
                let imp = match method.implementation {
                    Some(f) => self.function(f).name.clone(),
                    None => "abstract".to_string(),
                };
                out.push_str(&format!("  method {} = {}\n", method.name, imp));
            }
            out.push_str("}\n\n");
        }

        for g in &self.globals {
            let var = self.var(*g);
            out.push_str(&format!("global {}: {}\n", var.name, self.type_name(&var.ty)));
        }
        if !self.globals.is_empty() {
            out.push('\n');
        }

        for i in 0..self.functions.len() {
            out.push_str(&self.pretty_function(FunctionId::new(i as u32)));
            out.push('\n');
        }
        out
    }
}

impl Program {
    /// Print one function with its body
    pub fn pretty_function(&self, id: FunctionId) -> String {
        let func = self.function(id);
        let params: Vec<String> = func
            .params
            .iter()
            .map(|p| format!("{}: {}", self.var_name(*p), self.type_name(&self.var(*p).ty)))
            .collect();
        let mut out = format!(
            "{}fn {}({}) -> {}",
            if func.native { "native " } else { "" },
            func.name,
            params.join(", "),
            self.type_name(&func.return_ty)
        );
        if func.native {
            out.push('\n');
            return out;
        }
        out.push_str(" {\n");
        for l in &func.locals {
            out.push_str(&format!(
                "  local {}: {}\n",
                self.var_name(*l),
                self.type_name(&self.var(*l).ty)
            ));
        }
        let printer = BodyPrinter {
            program: self,
            body: &func.body,
        };
        printer.block(func.body.root(), 1, &mut out);
        out.push_str("}\n");
        out
    }

    fn var_name(&self, var: VarId) -> String {
        match self.vars.get(var.index()) {
            Some(v) => v.name.clone(),
            None => var.to_string(),
        }
    }

    fn type_name(&self, ty: &super::types::Type) -> String {
        use super::types::Type;
        match ty {
            Type::Class(c) => match self.classes.get(c.index()) {
                Some(class) => class.name.clone(),
                None => c.to_string(),
            },
            Type::Array(elem) => format!("array<{}>", self.type_name(elem)),
            other => other.to_string(),
        }
    }
}

struct BodyPrinter<'a> {
    program: &'a Program,
    body: &'a Body,
}

impl BodyPrinter<'_> {
    fn block(&self, stmts: &[StmtId], depth: usize, out: &mut String) {
        for s in stmts {
            self.stmt(*s, depth, out);
        }
    }

    fn stmt(&self, id: StmtId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match &self.body.stmt(id).kind {
            StmtKind::Assign { target, value } => {
                out.push_str(&format!(
                    "{}{} = {}\n",
                    pad,
                    self.program.var_name(*target),
                    self.expr(*value)
                ));
            }
            StmtKind::ArrayAssign {
                array,
                index,
                value,
            } => {
                out.push_str(&format!(
                    "{}{}[{}] = {}\n",
                    pad,
                    self.program.var_name(*array),
                    self.expr(*index),
                    self.expr(*value)
                ));
            }
            StmtKind::MemberAssign {
                receiver,
                field,
                value,
            } => {
                out.push_str(&format!(
                    "{}{}.{} = {}\n",
                    pad,
                    self.expr(*receiver),
                    self.field_name(field.class, field.index),
                    self.expr(*value)
                ));
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                out.push_str(&format!("{}if {} {{\n", pad, self.expr(*cond)));
                self.block(then_block, depth + 1, out);
                if !else_block.is_empty() {
                    out.push_str(&format!("{}}} else {{\n", pad));
                    self.block(else_block, depth + 1, out);
                }
                out.push_str(&format!("{}}}\n", pad));
            }
            StmtKind::Loop { body } => {
                out.push_str(&format!("{}loop {{\n", pad));
                self.block(body, depth + 1, out);
                out.push_str(&format!("{}}}\n", pad));
            }
            StmtKind::ExitWhen { cond } => {
                out.push_str(&format!("{}exitwhen {}\n", pad, self.expr(*cond)));
            }
            StmtKind::Return { value: Some(v) } => {
                out.push_str(&format!("{}return {}\n", pad, self.expr(*v)));
            }
            StmtKind::Return { value: None } => out.push_str(&format!("{}return\n", pad)),
            StmtKind::Expr(e) => out.push_str(&format!("{}{}\n", pad, self.expr(*e))),
            StmtKind::Dealloc { class, object } => {
                out.push_str(&format!(
                    "{}destroy<{}> {}\n",
                    pad,
                    self.class_name(*class),
                    self.expr(*object)
                ));
            }
            StmtKind::Trap { message } => {
                out.push_str(&format!("{}trap {:?}\n", pad, message));
            }
        }
    }

    fn expr(&self, id: ExprId) -> String {
        match &self.body.expr(id).kind {
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::VarRead(v) => self.program.var_name(*v),
            ExprKind::ArrayRead { array, index } => {
                format!("{}[{}]", self.program.var_name(*array), self.expr(*index))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(*lhs), op, self.expr(*rhs))
            }
            ExprKind::Unary { op, operand } => format!("({}{})", op, self.expr(*operand)),
            ExprKind::Call { func, args } => {
                let name = match self.program.functions.get(func.index()) {
                    Some(f) => f.name.clone(),
                    None => func.to_string(),
                };
                format!("{}({})", name, self.args(args))
            }
            ExprKind::MethodCall {
                method,
                receiver,
                args,
            } => {
                let name = match self.program.methods.get(method.index()) {
                    Some(m) => m.name.clone(),
                    None => method.to_string(),
                };
                format!("{}.{}({})", self.expr(*receiver), name, self.args(args))
            }
            ExprKind::MemberRead { receiver, field } => format!(
                "{}.{}",
                self.expr(*receiver),
                self.field_name(field.class, field.index)
            ),
            ExprKind::Alloc(c) => format!("new {}", self.class_name(*c)),
            ExprKind::InstanceOf { object, class } => {
                format!("({} instanceof {})", self.expr(*object), self.class_name(*class))
            }
            ExprKind::TypeIdOfClass(c) => format!("typeid({})", self.class_name(*c)),
            ExprKind::TypeIdOfObject(e) => format!("typeid({})", self.expr(*e)),
            ExprKind::Let { var, init, body } => format!(
                "(let {} = {} in {})",
                self.program.var_name(*var),
                self.expr(*init),
                self.expr(*body)
            ),
        }
    }

    fn args(&self, args: &[ExprId]) -> String {
        args.iter()
            .map(|a| self.expr(*a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn class_name(&self, class: super::program::ClassId) -> String {
        match self.program.classes.get(class.index()) {
            Some(c) => c.name.clone(),
            None => class.to_string(),
        }
    }

    fn field_name(&self, class: super::program::ClassId, index: u32) -> String {
        self.program
            .classes
            .get(class.index())
            .and_then(|c| c.fields.get(index as usize))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| format!("field{}", index))
    }
}
