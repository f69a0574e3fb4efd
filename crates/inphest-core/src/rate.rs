//! Rate functions — per-lineage weight modifiers applied to a model's mean rates.
//!
//! A [`RateFunction`] is one of three closed variants:
//!
//! - **fixed_value** — a constant.
//! - **formula** — an arithmetic expression over the fields of a
//!   [`RateContext`], parsed once at configuration time.
//! - **function_object** — a Rust closure registered by name in a
//!   [`RateFunctionRegistry`] before the model is parsed.
//!
//! Formulas use a small grammar: numbers, the context field names listed in
//! [`ContextField`], `+ - * / ^`, unary minus, parentheses, and the
//! functions `exp ln sqrt abs` (one argument) and `min max` (two arguments).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ConfigError, InphestError, Result};
use crate::types::SimTime;

/// Call-time context a rate function is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateContext {
    /// Elapsed simulation time.
    pub time: SimTime,
    /// Hosts infected by the focal symbiont lineage.
    pub num_hosts: usize,
    /// Areas occupied by the focal symbiont lineage.
    pub num_areas: usize,
    /// Occupied (host, area) cells of the focal symbiont lineage.
    pub num_cells: usize,
    /// Current symbiont lineages in the phylogeny.
    pub num_lineages: usize,
    /// Host lineages extant at `time`.
    pub num_extant_hosts: usize,
}

impl RateContext {
    pub fn field(&self, field: ContextField) -> f64 {
        match field {
            ContextField::Time => self.time,
            ContextField::NumHosts => self.num_hosts as f64,
            ContextField::NumAreas => self.num_areas as f64,
            ContextField::NumCells => self.num_cells as f64,
            ContextField::NumLineages => self.num_lineages as f64,
            ContextField::NumExtantHosts => self.num_extant_hosts as f64,
        }
    }
}

/// Names a formula may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    Time,
    NumHosts,
    NumAreas,
    NumCells,
    NumLineages,
    NumExtantHosts,
}

impl ContextField {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time" => Some(ContextField::Time),
            "num_hosts" => Some(ContextField::NumHosts),
            "num_areas" => Some(ContextField::NumAreas),
            "num_cells" => Some(ContextField::NumCells),
            "num_lineages" => Some(ContextField::NumLineages),
            "num_extant_hosts" => Some(ContextField::NumExtantHosts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Exp,
    Ln,
    Sqrt,
    Abs,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Func::Exp),
            "ln" => Some(Func::Ln),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Field(ContextField),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, ctx: &RateContext) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Field(field) => ctx.field(*field),
            Expr::Neg(inner) => -inner.eval(ctx),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(ctx), rhs.eval(ctx));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, args) => {
                let a = args[0].eval(ctx);
                match func {
                    Func::Exp => a.exp(),
                    Func::Ln => a.ln(),
                    Func::Sqrt => a.sqrt(),
                    Func::Abs => a.abs(),
                    Func::Min => a.min(args[1].eval(ctx)),
                    Func::Max => a.max(args[1].eval(ctx)),
                }
            }
        }
    }
}

/// A parsed arithmetic formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = FormulaParser {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        };
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        if parser.pos < parser.bytes.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &RateContext) -> f64 {
        self.expr.eval(ctx)
    }
}

/// Recursive-descent parser over the formula bytes.
struct FormulaParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl FormulaParser<'_> {
    fn error(&self, reason: impl Into<String>) -> InphestError {
        InphestError::Config(ConfigError::InvalidFormula {
            formula: self.source.to_string(),
            position: self.pos,
            reason: reason.into(),
        })
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    fn consume(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(b'+') => BinOp::Add,
                Some(b'-') => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(b'*') => BinOp::Mul,
                Some(b'/') => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // unary := '-' unary | power
    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume(b'-') {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_power()
    }

    // power := primary ('^' unary)?   (right associative)
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.consume(b'^') {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                if !self.consume(b')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.parse_identifier(),
            Some(c) => Err(self.error(format!("unexpected character '{}'", c as char))),
            None => Err(self.error("unexpected end of formula")),
        }
    }

    fn parse_number(&mut self) -> Result<Expr> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        // exponent suffix: 1e-3, 2.5E4
        if self.pos < self.bytes.len() && (self.bytes[self.pos] == b'e' || self.bytes[self.pos] == b'E') {
            let mark = self.pos;
            self.pos += 1;
            if self.pos < self.bytes.len() && (self.bytes[self.pos] == b'+' || self.bytes[self.pos] == b'-') {
                self.pos += 1;
            }
            if self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.source[start..self.pos];
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    fn parse_identifier(&mut self) -> Result<Expr> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let name = &self.source[start..self.pos];

        if self.peek() == Some(b'(') {
            let func = Func::from_name(name)
                .ok_or_else(|| self.error(format!("unknown function '{}'", name)))?;
            self.pos += 1;
            let mut args = vec![self.parse_expr()?];
            while self.consume(b',') {
                args.push(self.parse_expr()?);
            }
            if !self.consume(b')') {
                return Err(self.error("expected ')'"));
            }
            if args.len() != func.arity() {
                return Err(self.error(format!(
                    "function '{}' takes {} argument(s), got {}",
                    name,
                    func.arity(),
                    args.len()
                )));
            }
            return Ok(Expr::Call(func, args));
        }

        ContextField::from_name(name)
            .map(Expr::Field)
            .ok_or_else(|| self.error(format!("unknown identifier '{}'", name)))
    }
}

/// Signature of an externally supplied rate function.
pub type ExternalRateFn = Arc<dyn Fn(&RateContext) -> f64 + Send + Sync>;

/// Named external rate functions available to `function_object` definitions.
#[derive(Clone, Default)]
pub struct RateFunctionRegistry {
    functions: HashMap<String, ExternalRateFn>,
}

impl RateFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&RateContext) -> f64 + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<ExternalRateFn> {
        self.functions.get(name).cloned()
    }
}

impl fmt::Debug for RateFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("RateFunctionRegistry").field("functions", &names).finish()
    }
}

/// A scalar function of the rate context.
#[derive(Clone)]
pub enum RateFunction {
    Constant {
        value: f64,
        description: String,
    },
    Formula {
        formula: Formula,
        description: String,
    },
    External {
        name: String,
        function: ExternalRateFn,
        description: String,
    },
}

impl fmt::Debug for RateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateFunction::Constant { value, description } => f
                .debug_struct("Constant")
                .field("value", value)
                .field("description", description)
                .finish(),
            RateFunction::Formula { formula, description } => f
                .debug_struct("Formula")
                .field("formula", &formula.source())
                .field("description", description)
                .finish(),
            RateFunction::External { name, description, .. } => f
                .debug_struct("External")
                .field("name", name)
                .field("description", description)
                .finish(),
        }
    }
}

impl Default for RateFunction {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl RateFunction {
    pub const FIXED_VALUE: &'static str = "fixed_value";
    pub const FORMULA: &'static str = "formula";
    pub const FUNCTION_OBJECT: &'static str = "function_object";

    pub fn constant(value: f64) -> Self {
        RateFunction::Constant {
            value,
            description: format!("fixed: {:.2}", value),
        }
    }

    pub fn formula(source: &str, description: impl Into<String>) -> Result<Self> {
        Ok(RateFunction::Formula {
            formula: Formula::parse(source)?,
            description: description.into(),
        })
    }

    pub fn external<F>(name: impl Into<String>, function: F, description: impl Into<String>) -> Self
    where
        F: Fn(&RateContext) -> f64 + Send + Sync + 'static,
    {
        RateFunction::External {
            name: name.into(),
            function: Arc::new(function),
            description: description.into(),
        }
    }

    pub fn evaluate(&self, ctx: &RateContext) -> f64 {
        match self {
            RateFunction::Constant { value, .. } => *value,
            RateFunction::Formula { formula, .. } => formula.evaluate(ctx),
            RateFunction::External { function, .. } => function(ctx),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            RateFunction::Constant { description, .. }
            | RateFunction::Formula { description, .. }
            | RateFunction::External { description, .. } => description,
        }
    }

    pub fn definition_type(&self) -> &'static str {
        match self {
            RateFunction::Constant { .. } => Self::FIXED_VALUE,
            RateFunction::Formula { .. } => Self::FORMULA,
            RateFunction::External { .. } => Self::FUNCTION_OBJECT,
        }
    }

    /// Parse a `{definition_type, definition, description}` block.
    ///
    /// `definition_type` accepts hyphens in place of underscores. Any other
    /// key is an error.
    pub fn parse_definition(definition: &Value, registry: Option<&RateFunctionRegistry>) -> Result<Self> {
        let mut d: Map<String, Value> = match definition {
            Value::Object(map) => map.clone(),
            other => {
                return Err(ConfigError::InvalidType {
                    field: "rate function definition".to_string(),
                    expected: "an object",
                    found: other.to_string(),
                }
                .into())
            }
        };

        let definition_type = match d.remove("definition_type") {
            Some(Value::String(s)) => s.replace('-', "_"),
            Some(other) => {
                return Err(ConfigError::InvalidType {
                    field: "definition_type".to_string(),
                    expected: "a string",
                    found: other.to_string(),
                }
                .into())
            }
            None => return Err(ConfigError::MissingField("definition_type".to_string()).into()),
        };
        let content = d
            .remove("definition")
            .ok_or_else(|| ConfigError::MissingField("definition".to_string()))?;
        let description = match d.remove("description") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        if !d.is_empty() {
            return Err(InphestError::unsupported_keys(
                "function definition",
                d.keys().cloned().collect(),
            ));
        }

        match definition_type.as_str() {
            Self::FIXED_VALUE => {
                let value = match &content {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| ConfigError::InvalidType {
                    field: "definition".to_string(),
                    expected: "a number",
                    found: content.to_string(),
                })?;
                Ok(RateFunction::Constant { value, description })
            }
            Self::FORMULA => {
                let source = content.as_str().ok_or_else(|| ConfigError::InvalidType {
                    field: "definition".to_string(),
                    expected: "a formula string",
                    found: content.to_string(),
                })?;
                Ok(RateFunction::Formula {
                    formula: Formula::parse(source)?,
                    description,
                })
            }
            Self::FUNCTION_OBJECT => {
                let name = content.as_str().ok_or_else(|| ConfigError::InvalidType {
                    field: "definition".to_string(),
                    expected: "a registered function name",
                    found: content.to_string(),
                })?;
                let function = registry
                    .and_then(|r| r.get(name))
                    .ok_or_else(|| ConfigError::UnknownFunction(name.to_string()))?;
                Ok(RateFunction::External {
                    name: name.to_string(),
                    function,
                    description,
                })
            }
            other => Err(ConfigError::UnknownDefinitionType(other.to_string()).into()),
        }
    }

    /// The definition block this function was (or could have been) parsed from.
    pub fn as_definition(&self) -> Value {
        let mut d = Map::new();
        d.insert("definition_type".to_string(), Value::from(self.definition_type()));
        let content = match self {
            RateFunction::Constant { value, .. } => Value::from(*value),
            RateFunction::Formula { formula, .. } => Value::from(formula.source()),
            RateFunction::External { name, .. } => Value::from(name.as_str()),
        };
        d.insert("definition".to_string(), content);
        d.insert("description".to_string(), Value::from(self.description()));
        Value::Object(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RateContext {
        RateContext {
            time: 2.0,
            num_hosts: 3,
            num_areas: 2,
            num_cells: 4,
            num_lineages: 5,
            num_extant_hosts: 6,
        }
    }

    #[test]
    fn formula_precedence_and_fields() {
        let f = Formula::parse("1 + num_hosts * 2 ^ 2").unwrap();
        assert_eq!(f.evaluate(&ctx()), 13.0);

        let f = Formula::parse("-2 ^ 2").unwrap();
        assert_eq!(f.evaluate(&ctx()), -4.0);

        let f = Formula::parse("(num_areas + 1) / num_cells").unwrap();
        assert!((f.evaluate(&ctx()) - 0.75).abs() < 1e-12);

        let f = Formula::parse("max(num_lineages, num_extant_hosts) - min(time, 1e1)").unwrap();
        assert_eq!(f.evaluate(&ctx()), 4.0);

        let f = Formula::parse("exp(0) + ln(1) + sqrt(4) + abs(-1)").unwrap();
        assert_eq!(f.evaluate(&ctx()), 4.0);
    }

    #[test]
    fn formula_rejects_unknown_names() {
        let err = Formula::parse("num_hosts + bogus").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("bogus"));

        let err = Formula::parse("system(1)").unwrap_err();
        assert!(err.to_string().contains("unknown function"));

        assert!(Formula::parse("min(1)").is_err());
        assert!(Formula::parse("1 +").is_err());
        assert!(Formula::parse("(1 + 2").is_err());
        assert!(Formula::parse("1 2").is_err());
    }

    #[test]
    fn parse_fixed_value_with_hyphenated_tag() {
        let rf = RateFunction::parse_definition(
            &json!({"definition_type": "fixed-value", "definition": 0.5, "description": "half"}),
            None,
        )
        .unwrap();
        assert_eq!(rf.evaluate(&ctx()), 0.5);
        assert_eq!(rf.description(), "half");
        assert_eq!(rf.definition_type(), "fixed_value");
    }

    #[test]
    fn parse_rejects_unknown_tag_and_keys() {
        let err = RateFunction::parse_definition(
            &json!({"definition_type": "lambda_definition", "definition": "x"}),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("lambda_definition"));

        let err = RateFunction::parse_definition(
            &json!({"definition_type": "fixed_value", "definition": 1.0, "extra": 1}),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn function_object_resolves_through_registry() {
        let mut registry = RateFunctionRegistry::new();
        registry.register("per_host", |c: &RateContext| c.num_hosts as f64 * 0.1);
        let def = json!({"definition_type": "function_object", "definition": "per_host"});

        let rf = RateFunction::parse_definition(&def, Some(&registry)).unwrap();
        assert!((rf.evaluate(&ctx()) - 0.3).abs() < 1e-12);
        assert_eq!(rf.as_definition()["definition"], json!("per_host"));

        let err = RateFunction::parse_definition(&def, None).unwrap_err();
        assert!(err.to_string().contains("per_host"));
    }

    #[test]
    fn definition_round_trips() {
        let rf = RateFunction::formula("0.5 * num_hosts", "scaled by hosts").unwrap();
        let back = RateFunction::parse_definition(&rf.as_definition(), None).unwrap();
        assert_eq!(back.as_definition(), rf.as_definition());
        assert_eq!(back.evaluate(&ctx()), 1.5);
    }

    #[test]
    fn default_is_unit_constant() {
        let rf = RateFunction::default();
        assert_eq!(rf.evaluate(&RateContext::default()), 1.0);
        assert_eq!(rf.description(), "fixed: 1.00");
    }
}
