use serde::{Deserialize, Serialize};

use super::builtins::Builtin;
use super::value::Value;
use crate::error::{CodegenError, RuntimeError};
use crate::ir::{Array, BinaryOp, Naming, Node, Procedure, Stmt, UnaryOp};

/// Opcode set of the procedure VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Opcode {
    // stack and constants
    PushConst(f64), // push constant
    PushImag,       // push the imaginary unit
    LoadTime,       // push t
    LoadLocal(usize),
    StoreLocal(usize),
    Load(Array), // pop index, push array[index]

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Neg,

    // comparisons on real parts (push 0/1)
    Ne,
    Le,

    // control flow
    Jump(usize),        // absolute pc
    JumpIfFalse(usize), // pop cond, if zero jump

    Call(Builtin),

    StoreDerivative, // pop value, pop index, du[index] = value
    Fail(usize),     // abort with the unresolved symbol at this table position
}

/// Bytecode for one procedure, independent of the numeric type.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    code: Vec<Opcode>,
    n_locals: usize,
    unresolved: Vec<String>,
    naming: Naming,
    check_bounds: bool,
}

struct Compiler {
    code: Vec<Opcode>,
    scope: Vec<(String, usize)>,
    n_locals: usize,
    unresolved: Vec<String>,
    uses_imaginary: bool,
}

impl Compiler {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            scope: Vec::new(),
            n_locals: 0,
            unresolved: Vec::new(),
            uses_imaginary: false,
        }
    }

    fn local(&mut self) -> usize {
        self.n_locals += 1;
        self.n_locals - 1
    }

    fn emit(&mut self, op: Opcode) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn patch(&mut self, at: usize) {
        let target = self.code.len();
        if let Some(Opcode::JumpIfFalse(addr)) = self.code.get_mut(at) {
            *addr = target;
        }
    }

    /// `for var in lower..=upper { body }` with `body` emitted by the closure
    fn counted_loop(
        &mut self,
        var: &str,
        lower: &Node,
        upper: &Node,
        body: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        let slot = self.local();
        let hi = self.local();
        self.node(upper)?;
        self.emit(Opcode::StoreLocal(hi));
        self.node(lower)?;
        self.emit(Opcode::StoreLocal(slot));

        let top = self.code.len();
        self.emit(Opcode::LoadLocal(slot));
        self.emit(Opcode::LoadLocal(hi));
        self.emit(Opcode::Le);
        let exit = self.emit(Opcode::JumpIfFalse(0));

        self.scope.push((var.to_string(), slot));
        let result = body(self);
        self.scope.pop();
        result?;

        self.emit(Opcode::LoadLocal(slot));
        self.emit(Opcode::PushConst(1.0));
        self.emit(Opcode::Add);
        self.emit(Opcode::StoreLocal(slot));
        self.emit(Opcode::Jump(top));
        self.patch(exit);
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Assign { slot, value } => {
                self.node(slot)?;
                self.node(value)?;
                self.emit(Opcode::StoreDerivative);
                Ok(())
            }
            Stmt::Loop {
                var,
                lower,
                upper,
                body,
            } => self.counted_loop(var, lower, upper, |c| {
                body.iter().try_for_each(|s| c.stmt(s))
            }),
        }
    }

    fn node(&mut self, node: &Node) -> Result<(), CodegenError> {
        match node {
            Node::Const(v) => {
                self.emit(Opcode::PushConst(*v));
            }
            Node::ImaginaryUnit => {
                self.uses_imaginary = true;
                self.emit(Opcode::PushImag);
            }
            Node::Time => {
                self.emit(Opcode::LoadTime);
            }
            Node::Var(name) => {
                let slot = self
                    .scope
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, slot)| *slot)
                    .ok_or_else(|| CodegenError::malformed(format!("unbound variable '{}'", name)))?;
                self.emit(Opcode::LoadLocal(slot));
            }
            Node::Access {
                array: Array::Zero,
                ..
            } => return Err(CodegenError::malformed("residual zero-array access")),
            Node::Access { array, index } => {
                self.node(index)?;
                self.emit(Opcode::Load(*array));
            }
            Node::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                self.node(operand)?;
                self.emit(Opcode::Neg);
            }
            Node::Binary { op, lhs, rhs } => {
                self.node(lhs)?;
                self.node(rhs)?;
                self.emit(match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Sub,
                    BinaryOp::Mul => Opcode::Mul,
                    BinaryOp::Div => Opcode::Div,
                    BinaryOp::Pow => Opcode::Pow,
                });
            }
            Node::Call { func, args } => {
                let builtin = Builtin::from_name(func)
                    .ok_or_else(|| CodegenError::UnknownToken { name: func.clone() })?;
                for arg in args {
                    self.node(arg)?;
                }
                self.emit(Opcode::Call(builtin));
            }
            Node::Sum {
                var,
                lower,
                upper,
                excluded,
                body,
            } => {
                if !excluded.is_empty() {
                    return Err(CodegenError::malformed(format!(
                        "sum over '{}' still carries exclusions",
                        var
                    )));
                }
                let acc = self.local();
                self.emit(Opcode::PushConst(0.0));
                self.emit(Opcode::StoreLocal(acc));
                self.counted_loop(var, lower, upper, |c| {
                    c.emit(Opcode::LoadLocal(acc));
                    c.node(body)?;
                    c.emit(Opcode::Add);
                    c.emit(Opcode::StoreLocal(acc));
                    Ok(())
                })?;
                self.emit(Opcode::LoadLocal(acc));
            }
            Node::Indicator { left, right } => {
                self.node(left)?;
                self.node(right)?;
                self.emit(Opcode::Ne);
            }
            Node::Unresolved(name) => {
                let at = self.unresolved.len();
                self.unresolved.push(name.clone());
                self.emit(Opcode::Fail(at));
            }
            Node::Named(name) => return Err(CodegenError::UnknownToken { name: name.clone() }),
            Node::BoundedSum { .. } | Node::Guarded { .. } => {
                return Err(CodegenError::malformed(
                    "high-level node reached the bytecode compiler",
                ))
            }
        }
        Ok(())
    }
}

impl Program {
    /// Compile a checked procedure. Returns the program and whether it needs
    /// the imaginary unit.
    pub fn compile(procedure: &Procedure) -> Result<(Program, bool), CodegenError> {
        let mut compiler = Compiler::new();
        for stmt in procedure.body() {
            compiler.stmt(stmt)?;
        }
        let program = Program {
            code: compiler.code,
            n_locals: compiler.n_locals,
            unresolved: compiler.unresolved,
            naming: procedure.naming().clone(),
            check_bounds: procedure.check_bounds(),
        };
        Ok((program, compiler.uses_imaginary))
    }

    pub fn code(&self) -> &[Opcode] {
        &self.code
    }

    fn array_name(&self, array: Array) -> &str {
        match array {
            Array::State => &self.naming.state,
            Array::Param => &self.naming.params,
            Array::Zero => "zero",
        }
    }

    /// Convert an evaluated index to a slot
    fn slot<V: Value>(&self, array: &str, value: V) -> Result<usize, RuntimeError> {
        let r = value.real();
        if !r.is_finite() || r < -1e-9 || (r - r.round()).abs() > 1e-9 {
            return Err(RuntimeError::InvalidIndex {
                array: array.to_string(),
                value: r,
            });
        }
        Ok(r.round() as usize)
    }

    fn read<V: Value>(&self, data: &[V], array: &str, index: usize) -> Result<V, RuntimeError> {
        if self.check_bounds {
            data.get(index)
                .copied()
                .ok_or_else(|| RuntimeError::IndexOutOfBounds {
                    array: array.to_string(),
                    index,
                    len: data.len(),
                })
        } else {
            Ok(data[index])
        }
    }

    /// Execute the program, writing into `du`.
    pub fn run<V: Value>(&self, du: &mut [V], u: &[V], p: &[V], t: f64) -> Result<(), RuntimeError> {
        let mut stack: Vec<V> = Vec::with_capacity(16);
        let mut locals: Vec<V> = vec![V::zero(); self.n_locals];
        let mut pc: usize = 0;
        let code_len = self.code.len();

        while pc < code_len {
            match &self.code[pc] {
                Opcode::PushConst(v) => stack.push(V::from_f64(*v)),
                Opcode::PushImag => stack.push(V::imaginary_unit().unwrap_or_else(V::zero)),
                Opcode::LoadTime => stack.push(V::from_f64(t)),
                Opcode::LoadLocal(i) => stack.push(locals[*i]),
                Opcode::StoreLocal(i) => {
                    locals[*i] = stack.pop().unwrap_or_else(V::zero);
                }
                Opcode::Load(array) => {
                    let name = self.array_name(*array);
                    let index = self.slot(name, stack.pop().unwrap_or_else(V::zero))?;
                    let data = match array {
                        Array::State => u,
                        _ => p,
                    };
                    stack.push(self.read(data, name, index)?);
                }
                Opcode::Add => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(a + b);
                }
                Opcode::Sub => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(a - b);
                }
                Opcode::Mul => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(a * b);
                }
                Opcode::Div => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(a / b);
                }
                Opcode::Pow => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(Value::pow(a, b));
                }
                Opcode::Neg => {
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(-a);
                }
                Opcode::Ne => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(if a.real() != b.real() { V::one() } else { V::zero() });
                }
                Opcode::Le => {
                    let b = stack.pop().unwrap_or_else(V::zero);
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(if a.real() <= b.real() { V::one() } else { V::zero() });
                }
                Opcode::Jump(addr) => {
                    pc = *addr;
                    continue;
                }
                Opcode::JumpIfFalse(addr) => {
                    let c = stack.pop().unwrap_or_else(V::zero);
                    if c.real() == 0.0 {
                        pc = *addr;
                        continue;
                    }
                }
                Opcode::Call(builtin) => {
                    let a = stack.pop().unwrap_or_else(V::zero);
                    stack.push(a.apply(*builtin));
                }
                Opcode::StoreDerivative => {
                    let value = stack.pop().unwrap_or_else(V::zero);
                    let name = self.naming.derivative.as_str();
                    let index = self.slot(name, stack.pop().unwrap_or_else(V::zero))?;
                    if self.check_bounds && index >= du.len() {
                        return Err(RuntimeError::IndexOutOfBounds {
                            array: name.to_string(),
                            index,
                            len: du.len(),
                        });
                    }
                    du[index] = value;
                }
                Opcode::Fail(at) => {
                    return Err(RuntimeError::UnresolvedSymbol {
                        name: self.unresolved.get(*at).cloned().unwrap_or_default(),
                    })
                }
            }
            pc += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn compile(body: Vec<Stmt>, check_bounds: bool) -> Program {
        let procedure = Procedure::new(Naming::default(), vec![], vec![], body, check_bounds);
        Program::compile(&procedure).unwrap().0
    }

    #[test]
    fn test_straight_line_assignment() {
        let program = compile(
            vec![Stmt::assign(
                Node::int(0),
                Node::neg(Node::binary(
                    BinaryOp::Mul,
                    Node::access(Array::Param, Node::int(0)),
                    Node::access(Array::State, Node::int(0)),
                )),
            )],
            true,
        );
        let mut du = [0.0];
        program.run(&mut du, &[2.0], &[0.5], 0.0).unwrap();
        assert_relative_eq!(du[0], -1.0);
    }

    #[test]
    fn test_loop_with_native_sum() {
        // du[i - 1] = Σ_{j=1..3} u[j - 1] for i in 1..=2
        let sum = Node::Sum {
            var: "j".into(),
            lower: Box::new(Node::int(1)),
            upper: Box::new(Node::int(3)),
            excluded: vec![],
            body: Box::new(Node::access(
                Array::State,
                Node::sub(Node::var("j"), Node::int(1)),
            )),
        };
        let program = compile(
            vec![Stmt::Loop {
                var: "i".into(),
                lower: Node::int(1),
                upper: Node::int(2),
                body: vec![Stmt::assign(Node::sub(Node::var("i"), Node::int(1)), sum)],
            }],
            true,
        );
        let mut du = [0.0; 2];
        program.run(&mut du, &[1.0, 2.0, 4.0], &[], 0.0).unwrap();
        assert_relative_eq!(du[0], 7.0);
        assert_relative_eq!(du[1], 7.0);
    }

    #[test]
    fn test_out_of_bounds_read_is_reported() {
        let program = compile(
            vec![Stmt::assign(
                Node::int(0),
                Node::access(Array::State, Node::int(5)),
            )],
            true,
        );
        let mut du = [0.0];
        let err = program.run(&mut du, &[1.0], &[], 0.0).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::IndexOutOfBounds {
                array: "u".into(),
                index: 5,
                len: 1
            }
        );
    }

    #[test]
    fn test_unresolved_bound_fails_on_execution() {
        let program = compile(
            vec![Stmt::Loop {
                var: "i".into(),
                lower: Node::int(1),
                upper: Node::Unresolved("M".into()),
                body: vec![Stmt::assign(Node::var("i"), Node::int(0))],
            }],
            true,
        );
        let mut du = [0.0; 2];
        let err = program.run(&mut du, &[], &[], 0.0).unwrap_err();
        assert_eq!(err, RuntimeError::UnresolvedSymbol { name: "M".into() });
    }

    #[test]
    fn test_non_integral_index_is_invalid() {
        let program = compile(
            vec![Stmt::assign(
                Node::int(0),
                Node::access(Array::Param, Node::Const(0.5)),
            )],
            true,
        );
        let mut du = [0.0];
        let err = program.run(&mut du, &[], &[1.0], 0.0).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidIndex { .. }));
    }
}
