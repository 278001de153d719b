//! Runtime component for the import statement.

use std::sync::Arc;

use crate::ast::AstNode;
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::evaluator::{BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime};
use crate::parser;
use crate::scope::{name_from_ast_node, ScopeRef};

struct ImportRuntime {
    base: BaseRuntime,
}

pub fn import_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(ImportRuntime {
        base: BaseRuntime::new(erp, ast),
    })
}

impl NodeRuntime for ImportRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let path = self.base.node.children[0].token_value().to_string();
        let as_name = self.base.node.children[1].token_value().to_string();

        let locator = self.base.erp.import_locator.clone().ok_or_else(|| {
            self.base.error(
                ErrorKind::InvalidState,
                "No import locator was specified",
            )
        })?;

        let source = locator
            .resolve(&path)
            .map_err(|e| self.base.error(ErrorKind::InvalidState, e.to_string()))?;

        // The imported source gets its own runtime provider sharing the
        // locator and logger of this one, and evaluates in a fresh child
        // scope whose top level bindings become the module map.
        let result: EvalResult = (|| {
            let erp = self.base.erp.fork(path.as_str());

            let runtime = parser::parse_with_runtime(&path, &source, &erp)
                .map_err(|e| self.base.error(ErrorKind::InvalidState, e.to_string()))?;

            runtime.validate()?;

            let import_scope = vs.new_child(name_from_ast_node(&self.base.node));
            let mut import_is = is.child();
            runtime.eval(&import_scope, &mut import_is)?;

            let bindings = import_scope.local_bindings().into_iter().collect();
            Ok(Value::map(bindings))
        })();

        locator.finished(&path);

        let module = result?;
        vs.set_value(&as_name, module);

        Ok(Value::Null)
    }
}
