//! Source rendering of a [`Procedure`]
//!
//! The output is the body of a plain Rust function
//! `fn diffeq(du, u, p, t)` over either `f64` or `Complex64`.

use super::{Array, BinaryOp, LayoutEntry, Node, Procedure, Stmt, UnaryOp};

/// Target numeric type of the rendered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub scalar: &'static str,
    pub complex: bool,
}

impl Dialect {
    pub const REAL: Dialect = Dialect {
        scalar: "f64",
        complex: false,
    };

    pub const COMPLEX: Dialect = Dialect {
        scalar: "Complex64",
        complex: true,
    };
}

/// Render a procedure as Rust source in the given dialect
pub fn render(procedure: &Procedure, dialect: Dialect) -> String {
    SourceRenderer::new(procedure, dialect).render()
}

struct SourceRenderer<'a> {
    procedure: &'a Procedure,
    dialect: Dialect,
}

impl<'a> SourceRenderer<'a> {
    fn new(procedure: &'a Procedure, dialect: Dialect) -> Self {
        Self { procedure, dialect }
    }

    fn render(&self) -> String {
        let naming = self.procedure.naming();
        let scalar = self.dialect.scalar;
        let mut lines = vec![self.layout_comment()];
        let (indent, closing) = if self.procedure.check_bounds() {
            (1, String::new())
        } else {
            lines.push("    unsafe {".to_string());
            (2, "    }\n".to_string())
        };
        for stmt in self.procedure.body() {
            self.stmt(stmt, indent, &mut lines);
        }
        format!(
            "fn diffeq({du}: &mut [{scalar}], {u}: &[{scalar}], {p}: &[{scalar}], {t}: f64) {{\n{body}\n{closing}}}\n",
            du = naming.derivative,
            u = naming.state,
            p = naming.params,
            t = naming.time,
            scalar = scalar,
            body = lines.join("\n"),
            closing = closing,
        )
    }

    fn layout_comment(&self) -> String {
        let entries: Vec<String> = self
            .procedure
            .states()
            .iter()
            .map(|entry| match entry {
                LayoutEntry::Scalar { name, slot } => format!("{}@{}", name, slot),
                LayoutEntry::Family { name, start, len } => {
                    format!("{}@{}+{}", name, self.index(start), self.index(len))
                }
            })
            .collect();
        format!("    // states: {}", entries.join(", "))
    }

    fn stmt(&self, stmt: &Stmt, depth: usize, lines: &mut Vec<String>) {
        let pad = "    ".repeat(depth);
        match stmt {
            Stmt::Assign { slot, value } => {
                let target = self.slot(&self.procedure.naming().derivative, slot, true);
                lines.push(format!("{}{} = {};", pad, target, self.value(value)));
            }
            Stmt::Loop {
                var,
                lower,
                upper,
                body,
            } => {
                lines.push(format!(
                    "{}for {} in {}..={} {{",
                    pad,
                    var,
                    self.index(lower),
                    self.index(upper)
                ));
                for inner in body {
                    self.stmt(inner, depth + 1, lines);
                }
                lines.push(format!("{}}}", pad));
            }
        }
    }

    fn slot(&self, array: &str, index: &Node, write: bool) -> String {
        let idx = match index {
            Node::Const(v) => format!("{}", *v as i64),
            other => format!("({}) as usize", self.index(other)),
        };
        match (self.procedure.check_bounds(), write) {
            (true, _) => format!("{}[{}]", array, idx),
            (false, false) => format!("*{}.get_unchecked({})", array, idx),
            (false, true) => format!("*{}.get_unchecked_mut({})", array, idx),
        }
    }

    fn array_name(&self, array: Array) -> &str {
        let naming = self.procedure.naming();
        match array {
            Array::State => &naming.state,
            Array::Param => &naming.params,
            Array::Zero => "ZERO",
        }
    }

    fn constant(&self, v: f64) -> String {
        if self.dialect.complex {
            format!("Complex64::new({:?}, 0.0)", v)
        } else {
            format!("{:?}", v)
        }
    }

    fn lift(&self, real: String) -> String {
        if self.dialect.complex {
            format!("Complex64::new({}, 0.0)", real)
        } else {
            real
        }
    }

    /// Render in index context, producing an `i64` expression
    fn index(&self, node: &Node) -> String {
        match node {
            Node::Const(v) => format!("{}", *v as i64),
            Node::Var(name) => name.clone(),
            Node::Access { array, index } => {
                let read = self.slot(self.array_name(*array), index, false);
                if self.dialect.complex {
                    format!("({}.re as i64)", read)
                } else {
                    format!("({} as i64)", read)
                }
            }
            Node::Binary { op, lhs, rhs } if *op != BinaryOp::Pow => {
                format!("({} {} {})", self.index(lhs), op.symbol(), self.index(rhs))
            }
            Node::Unary {
                op: UnaryOp::Neg,
                operand,
            } => format!("-{}", self.index(operand)),
            Node::Unresolved(name) => format!("panic!(\"unresolved symbol '{}'\")", name),
            other => {
                if self.dialect.complex {
                    format!("(({}).re as i64)", self.value(other))
                } else {
                    format!("(({}) as i64)", self.value(other))
                }
            }
        }
    }

    /// Render in value context, producing an expression of the dialect's scalar type
    fn value(&self, node: &Node) -> String {
        let zero = self.constant(0.0);
        let one = self.constant(1.0);
        match node {
            Node::Const(v) => self.constant(*v),
            Node::ImaginaryUnit => {
                if self.dialect.complex {
                    "Complex64::i()".to_string()
                } else {
                    "compile_error!(\"imaginary unit in a real procedure\")".to_string()
                }
            }
            Node::Named(name) => name.clone(),
            Node::Time => self.lift(self.procedure.naming().time.clone()),
            Node::Var(name) => self.lift(format!("({} as f64)", name)),
            Node::Access {
                array: Array::Zero,
                ..
            } => zero,
            Node::Access { array, index } => self.slot(self.array_name(*array), index, false),
            Node::Unary {
                op: UnaryOp::Neg,
                operand,
            } => format!("-({})", self.value(operand)),
            Node::Binary {
                op: BinaryOp::Pow,
                lhs,
                rhs,
            } => {
                let method = if self.dialect.complex { "powc" } else { "powf" };
                format!("({}).{}({})", self.value(lhs), method, self.value(rhs))
            }
            Node::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.value(lhs), op.symbol(), self.value(rhs))
            }
            Node::Call { func, args } => self.call(func, args),
            Node::BoundedSum {
                var,
                lower,
                upper,
                excluded,
                body,
            } => {
                let filters: Vec<String> =
                    excluded.iter().map(|e| self.filter(var, e)).collect();
                self.sum(var, lower, upper, &filters, body)
            }
            Node::Sum {
                var,
                lower,
                upper,
                excluded,
                body,
            } => {
                let filters: Vec<String> = excluded
                    .iter()
                    .map(|e| self.filter(var, &e.value))
                    .collect();
                self.sum(var, lower, upper, &filters, body)
            }
            Node::Guarded { left, right, body } => format!(
                "(if {} != {} {{ {} }} else {{ {} }})",
                self.index(left),
                self.index(right),
                self.value(body),
                zero
            ),
            Node::Indicator { left, right } => format!(
                "(if {} != {} {{ {} }} else {{ {} }})",
                self.index(left),
                self.index(right),
                one,
                zero
            ),
            Node::Unresolved(name) => format!("panic!(\"unresolved symbol '{}'\")", name),
        }
    }

    fn filter(&self, var: &str, excluded: &Node) -> String {
        format!(".filter(|&{v}| {v} != {e})", v = var, e = self.index(excluded))
    }

    fn sum(&self, var: &str, lower: &Node, upper: &Node, filters: &[String], body: &Node) -> String {
        format!(
            "({}..={}){}.map(|{}| {}).sum::<{}>()",
            self.index(lower),
            self.index(upper),
            filters.concat(),
            var,
            self.value(body),
            self.dialect.scalar
        )
    }

    fn call(&self, func: &str, args: &[Node]) -> String {
        let rendered: Vec<String> = args.iter().map(|a| self.value(a)).collect();
        let [x] = rendered.as_slice() else {
            return format!("{}({})", func, rendered.join(", "));
        };
        match (func, self.dialect.complex) {
            ("sin" | "cos" | "exp" | "sqrt", _) => format!("({}).{}()", x, func),
            ("log", _) => format!("({}).ln()", x),
            ("abs", true) => format!("Complex64::new(({}).norm(), 0.0)", x),
            ("abs", false) => format!("({}).abs()", x),
            ("real", true) => format!("Complex64::new(({}).re, 0.0)", x),
            ("imag", true) => format!("Complex64::new(({}).im, 0.0)", x),
            ("conj", true) => format!("({}).conj()", x),
            ("real" | "conj", false) => x.clone(),
            ("imag", false) => "0.0".to_string(),
            _ => format!("{}({})", func, x),
        }
    }
}
