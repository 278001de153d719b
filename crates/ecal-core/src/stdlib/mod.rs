//! Standard library catalog.
//!
//! Functions and constants are registered under dotted names such as
//! `math.sqrt`. The catalog is process-wide and lazily initialized.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::evaluator::errors::{ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::evaluator::InstanceState;
use crate::scope::ScopeRef;
use crate::util::types::{EcalFunction, FuncContext};

/// Math function over one number.
struct MathFunc {
    name: &'static str,
    doc: &'static str,
    f: fn(f64) -> f64,
}

impl EcalFunction for MathFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let arg = args.first().and_then(|v| v.as_number()).ok_or_else(|| {
            ctx.error(
                ErrorKind::RuntimeError,
                format!("Function {} requires a number argument", self.name),
            )
        })?;

        Ok(Value::Number((self.f)(arg)))
    }

    fn doc_string(&self) -> String {
        self.doc.to_string()
    }
}

/// Math function over two numbers.
struct MathFunc2 {
    name: &'static str,
    doc: &'static str,
    f: fn(f64, f64) -> f64,
}

impl EcalFunction for MathFunc2 {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let a = args.first().and_then(|v| v.as_number());
        let b = args.get(1).and_then(|v| v.as_number());

        match (a, b) {
            (Some(a), Some(b)) => Ok(Value::Number((self.f)(a, b))),
            _ => Err(ctx.error(
                ErrorKind::RuntimeError,
                format!("Function {} requires two number arguments", self.name),
            )),
        }
    }

    fn doc_string(&self) -> String {
        self.doc.to_string()
    }
}

static PKG_DOCS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("math", "Mathematics related functions and constants.");
    m
});

static STDLIB_CONSTS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("math.Pi", Value::Number(std::f64::consts::PI));
    m.insert("math.E", Value::Number(std::f64::consts::E));
    m.insert("math.Phi", Value::Number((1.0 + 5.0f64.sqrt()) / 2.0));
    m
});

static STDLIB_FUNCS: Lazy<HashMap<&'static str, Arc<dyn EcalFunction>>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Arc<dyn EcalFunction>> = HashMap::new();

    macro_rules! math_fn {
        ($name:literal, $doc:literal, $f:expr) => {
            m.insert(
                concat!("math.", $name),
                Arc::new(MathFunc {
                    name: concat!("math.", $name),
                    doc: $doc,
                    f: $f,
                }),
            );
        };
    }

    math_fn!("sqrt", "Sqrt returns the square root of a number.", f64::sqrt);
    math_fn!("sin", "Sin returns the sine of a radian argument.", f64::sin);
    math_fn!("cos", "Cos returns the cosine of a radian argument.", f64::cos);
    math_fn!("tan", "Tan returns the tangent of a radian argument.", f64::tan);
    math_fn!("floor", "Floor returns the greatest integer value less than or equal to a number.", f64::floor);
    math_fn!("ceil", "Ceil returns the least integer value greater than or equal to a number.", f64::ceil);
    math_fn!("abs", "Abs returns the absolute value of a number.", f64::abs);
    math_fn!("log", "Log returns the natural logarithm of a number.", f64::ln);
    math_fn!("log2", "Log2 returns the binary logarithm of a number.", f64::log2);
    math_fn!("log10", "Log10 returns the decimal logarithm of a number.", f64::log10);
    math_fn!("exp", "Exp returns e raised to the power of a number.", f64::exp);

    m.insert(
        "math.pow",
        Arc::new(MathFunc2 {
            name: "math.pow",
            doc: "Pow returns x raised to the power of y.",
            f: f64::powf,
        }),
    );

    m
});

/// Look up a stdlib function by its dotted name.
pub fn get_stdlib_func(name: &str) -> Option<Arc<dyn EcalFunction>> {
    STDLIB_FUNCS.get(name).cloned()
}

/// Look up a stdlib constant by its dotted name.
pub fn get_stdlib_const(name: &str) -> Option<Value> {
    STDLIB_CONSTS.get(name).cloned()
}

/// Documentation of a stdlib package.
pub fn get_pkg_doc_string(pkg: &str) -> Option<&'static str> {
    PKG_DOCS.get(pkg).copied()
}

/// All registered packages, constants and functions.
pub fn symbols() -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut pkgs: Vec<String> = PKG_DOCS.keys().map(|s| s.to_string()).collect();
    let mut consts: Vec<String> = STDLIB_CONSTS.keys().map(|s| s.to_string()).collect();
    let mut funcs: Vec<String> = STDLIB_FUNCS.keys().map(|s| s.to_string()).collect();

    pkgs.sort();
    consts.sort();
    funcs.sort();

    (pkgs, consts, funcs)
}

/// Split a dotted symbol into its module and the remaining name. The
/// remaining name keeps all further dots.
pub fn split_module_and_name(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((module, rest)) => (module.to_string(), rest.to_string()),
        None => (name.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_module_and_name() {
        assert_eq!(
            split_module_and_name("math.Pi"),
            ("math".to_string(), "Pi".to_string())
        );
        // The tail keeps its dots.
        assert_eq!(
            split_module_and_name("a.b.c"),
            ("a".to_string(), "b.c".to_string())
        );
        assert_eq!(split_module_and_name("x"), ("x".to_string(), String::new()));
        assert_eq!(split_module_and_name(""), (String::new(), String::new()));
    }

    #[test]
    fn test_symbol_lookup() {
        assert!(get_stdlib_func("math.sqrt").is_some());
        assert!(get_stdlib_func("math.nope").is_none());

        match get_stdlib_const("math.Pi") {
            Some(Value::Number(n)) => assert!((n - std::f64::consts::PI).abs() < 1e-12),
            v => panic!("unexpected value: {:?}", v),
        }

        assert_eq!(
            get_pkg_doc_string("math"),
            Some("Mathematics related functions and constants.")
        );

        let (pkgs, consts, funcs) = symbols();
        assert_eq!(pkgs, vec!["math"]);
        assert!(consts.contains(&"math.Pi".to_string()));
        assert!(funcs.contains(&"math.pow".to_string()));
    }
}
