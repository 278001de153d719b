//! Runtime component for assignments, including destructuring.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::ast::{node, AstNode};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::rt_identifier::{identifier_runtime, IdentifierRuntime};
use crate::evaluator::value::Value;
use crate::evaluator::{BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime};
use crate::scope::ScopeRef;

struct AssignmentRuntime {
    base: BaseRuntime,
    left: OnceCell<Vec<Arc<IdentifierRuntime>>>,
    rhs: Arc<dyn NodeRuntime>,
}

pub fn assignment_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(AssignmentRuntime {
        base: BaseRuntime::new(erp, ast),
        left: OnceCell::new(),
        rhs: erp.runtime(&ast.children[1]),
    })
}

impl NodeRuntime for AssignmentRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        let left_node = &self.base.node.children[0];
        let mut left = Vec::new();

        if left_node.name == node::IDENTIFIER {
            left.push(identifier_runtime(&self.base.erp, left_node));
        } else if left_node.name == node::LIST {
            for child in &left_node.children {
                // Access chains are not allowed inside a destructuring list.
                if child.name != node::IDENTIFIER || !child.children.is_empty() {
                    return Err(self.base.error(
                        ErrorKind::VarAccess,
                        "Must have a list of variables on the left side of the assignment",
                    ));
                }

                left.push(identifier_runtime(&self.base.erp, child));
            }
        } else {
            return Err(self.base.error(
                ErrorKind::VarAccess,
                "Must have a variable or list of variables on the left side of the assignment",
            ));
        }

        for ident in &left {
            ident.validate()?;
        }

        let _ = self.left.set(left);
        self.rhs.validate()?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let left = self.left.get().expect("validated assignment");
        let value = self.rhs.eval(vs, is)?;

        if left.len() == 1 {
            left[0].set(vs, is, value)?;
            return Ok(Value::Null);
        }

        match value {
            Value::List(ref l) => {
                let items = l.read().clone();

                if left.len() != items.len() {
                    return Err(self.base.error(
                        ErrorKind::InvalidState,
                        format!(
                            "Assigned number of variables is different to number of values ({} variables vs {} values)",
                            left.len(),
                            items.len()
                        ),
                    ));
                }

                for (ident, item) in left.iter().zip(items) {
                    ident.set(vs, is, item)?;
                }

                Ok(Value::Null)
            }
            v => Err(self.base.error(
                ErrorKind::InvalidState,
                format!("Result is not a list (value is {})", v),
            )),
        }
    }
}
