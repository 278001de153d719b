//! Runtime components for arithmetic, comparison, boolean and condition
//! operators.

use std::sync::Arc;

use regex::Regex;

use crate::ast::AstNode;
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::evaluator::{
    build_children, validate_all, BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime,
};
use crate::scope::ScopeRef;

#[derive(Clone, Copy, PartialEq)]
enum Op {
    Plus,
    Minus,
    Times,
    Div,
    DivInt,
    ModInt,

    Eq,
    Neq,
    Gt,
    Lt,
    Geq,
    Leq,

    And,
    Or,
    Not,

    Like,
    In,
    NotIn,
    HasPrefix,
    HasSuffix,
}

struct OpRuntime {
    base: BaseRuntime,
    op: Op,
    operands: Vec<Arc<dyn NodeRuntime>>,
}

fn op_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>, op: Op) -> Arc<dyn NodeRuntime> {
    Arc::new(OpRuntime {
        base: BaseRuntime::new(erp, node),
        op,
        operands: build_children(erp, node),
    })
}

macro_rules! op_constructors {
    ($($name:ident => $op:expr),* $(,)?) => {
        $(
            pub fn $name(
                erp: &Arc<EcalRuntimeProvider>,
                node: &Arc<AstNode>,
            ) -> Arc<dyn NodeRuntime> {
                op_inst(erp, node, $op)
            }
        )*
    };
}

op_constructors! {
    plus_inst => Op::Plus,
    minus_inst => Op::Minus,
    times_inst => Op::Times,
    div_inst => Op::Div,
    divint_inst => Op::DivInt,
    modint_inst => Op::ModInt,
    equal_inst => Op::Eq,
    notequal_inst => Op::Neq,
    greater_inst => Op::Gt,
    less_inst => Op::Lt,
    greaterequal_inst => Op::Geq,
    lessequal_inst => Op::Leq,
    and_inst => Op::And,
    or_inst => Op::Or,
    not_inst => Op::Not,
    like_inst => Op::Like,
    in_inst => Op::In,
    notin_inst => Op::NotIn,
    beginswith_inst => Op::HasPrefix,
    endswith_inst => Op::HasSuffix,
}

impl OpRuntime {
    fn assert_number(&self, v: &Value) -> Result<f64, EcalError> {
        v.as_number()
            .ok_or_else(|| self.base.error(ErrorKind::NotANumber, v.to_string()))
    }

    fn assert_bool(&self, v: &Value) -> Result<bool, EcalError> {
        match v {
            Value::Bool(b) => Ok(*b),
            v => Err(self.base.error(ErrorKind::NotABoolean, v.to_string())),
        }
    }

    fn assert_list<'a>(&self, v: &'a Value) -> Result<&'a crate::evaluator::value::ListRef, EcalError> {
        match v {
            Value::List(l) => Ok(l),
            v => Err(self.base.error(ErrorKind::NotAList, v.to_string())),
        }
    }

    fn numeric(
        &self,
        vs: &ScopeRef,
        is: &mut InstanceState,
        f: impl Fn(f64, f64) -> f64,
    ) -> EvalResult {
        let a = self.assert_number(&self.operands[0].eval(vs, is)?)?;
        let b = self.assert_number(&self.operands[1].eval(vs, is)?)?;
        Ok(Value::Number(f(a, b)))
    }

    fn numeric_cmp(
        &self,
        vs: &ScopeRef,
        is: &mut InstanceState,
        f: impl Fn(f64, f64) -> bool,
    ) -> EvalResult {
        let a = self.assert_number(&self.operands[0].eval(vs, is)?)?;
        let b = self.assert_number(&self.operands[1].eval(vs, is)?)?;
        Ok(Value::Bool(f(a, b)))
    }
}

impl NodeRuntime for OpRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        let arity = match self.op {
            Op::Not => 1,
            Op::Minus => self.operands.len().clamp(1, 2),
            _ => 2,
        };

        if self.operands.len() != arity {
            return Err(self.base.error(
                ErrorKind::InvalidConstruct,
                format!("Operator needs {} operand(s)", arity),
            ));
        }

        validate_all(&self.operands)?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        match self.op {
            Op::Plus => self.numeric(vs, is, |a, b| a + b),
            Op::Minus if self.operands.len() == 1 => {
                let a = self.assert_number(&self.operands[0].eval(vs, is)?)?;
                Ok(Value::Number(-a))
            }
            Op::Minus => self.numeric(vs, is, |a, b| a - b),
            Op::Times => self.numeric(vs, is, |a, b| a * b),
            Op::Div => self.numeric(vs, is, |a, b| a / b),

            // Integer operations truncate toward zero.
            Op::DivInt | Op::ModInt => {
                let a = self.assert_number(&self.operands[0].eval(vs, is)?)?.trunc() as i64;
                let b = self.assert_number(&self.operands[1].eval(vs, is)?)?.trunc() as i64;

                if b == 0 {
                    return Err(self
                        .base
                        .error(ErrorKind::InvalidState, "Division by zero"));
                }

                let res = if self.op == Op::DivInt { a / b } else { a % b };
                Ok(Value::Number(res as f64))
            }

            Op::Eq => {
                let a = self.operands[0].eval(vs, is)?;
                let b = self.operands[1].eval(vs, is)?;
                Ok(Value::Bool(a == b))
            }
            Op::Neq => {
                let a = self.operands[0].eval(vs, is)?;
                let b = self.operands[1].eval(vs, is)?;
                Ok(Value::Bool(a != b))
            }
            Op::Gt => self.numeric_cmp(vs, is, |a, b| a > b),
            Op::Lt => self.numeric_cmp(vs, is, |a, b| a < b),
            Op::Geq => self.numeric_cmp(vs, is, |a, b| a >= b),
            Op::Leq => self.numeric_cmp(vs, is, |a, b| a <= b),

            Op::And => {
                let a = self.assert_bool(&self.operands[0].eval(vs, is)?)?;
                if !a {
                    return Ok(Value::Bool(false));
                }
                let b = self.assert_bool(&self.operands[1].eval(vs, is)?)?;
                Ok(Value::Bool(b))
            }
            Op::Or => {
                let a = self.assert_bool(&self.operands[0].eval(vs, is)?)?;
                if a {
                    return Ok(Value::Bool(true));
                }
                let b = self.assert_bool(&self.operands[1].eval(vs, is)?)?;
                Ok(Value::Bool(b))
            }
            Op::Not => {
                let a = self.assert_bool(&self.operands[0].eval(vs, is)?)?;
                Ok(Value::Bool(!a))
            }

            Op::Like => {
                let a = self.operands[0].eval(vs, is)?.to_string();
                let pattern = self.operands[1].eval(vs, is)?.to_string();

                let re = Regex::new(&pattern).map_err(|_| {
                    self.base.error(
                        ErrorKind::InvalidState,
                        format!("Invalid regex: {}", pattern),
                    )
                })?;

                Ok(Value::Bool(re.is_match(&a)))
            }
            Op::HasPrefix => {
                let a = self.operands[0].eval(vs, is)?.to_string();
                let b = self.operands[1].eval(vs, is)?.to_string();
                Ok(Value::Bool(a.starts_with(&b)))
            }
            Op::HasSuffix => {
                let a = self.operands[0].eval(vs, is)?.to_string();
                let b = self.operands[1].eval(vs, is)?.to_string();
                Ok(Value::Bool(a.ends_with(&b)))
            }
            Op::In | Op::NotIn => {
                let a = self.operands[0].eval(vs, is)?;
                let b = self.operands[1].eval(vs, is)?;
                let list = self.assert_list(&b)?;

                let contained = list.read().iter().any(|v| *v == a);
                Ok(Value::Bool(if self.op == Op::In {
                    contained
                } else {
                    !contained
                }))
            }
        }
    }
}
