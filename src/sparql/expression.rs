//! FILTER / BIND expression evaluation

use super::executor::{compatible, ActiveGraph, Evaluator, Solution};
use super::{SparqlError, SparqlResult};
use crate::engine::descriptor::TermDescriptor;
use crate::rdf::XSD_STRING;
use regex::RegexBuilder;
use spargebra::algebra::{Expression, Function};
use std::cmp::Ordering;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Integer-valued XSD types, by local name
const INTEGER_TYPES: &[&str] = &[
    "integer",
    "int",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "positiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
];

fn xsd_local(datatype: &str) -> Option<&str> {
    datatype.strip_prefix(XSD)
}

fn is_integer_type(datatype: &str) -> bool {
    xsd_local(datatype).is_some_and(|l| INTEGER_TYPES.contains(&l))
}

fn is_numeric_type(datatype: &str) -> bool {
    is_integer_type(datatype)
        || matches!(xsd_local(datatype), Some("decimal") | Some("float") | Some("double"))
}

/// Numeric value of a literal, if it has a numeric datatype
fn numeric(term: &TermDescriptor) -> Option<f64> {
    let datatype = term.datatype()?;
    if !is_numeric_type(datatype) {
        return None;
    }
    term.value().trim().parse().ok()
}

fn integer(term: &TermDescriptor) -> Option<i64> {
    let datatype = term.datatype()?;
    if !is_integer_type(datatype) {
        return None;
    }
    term.value().trim().parse().ok()
}

fn boolean(value: bool) -> TermDescriptor {
    TermDescriptor::typed_literal(if value { "true" } else { "false" }, XSD_BOOLEAN)
}

/// Simple literal or `xsd:string`
fn is_string(term: &TermDescriptor) -> bool {
    term.datatype() == Some(XSD_STRING)
}

fn string_arg(term: &TermDescriptor) -> SparqlResult<&str> {
    if term.is_literal() && (is_string(term) || term.lang().is_some()) {
        Ok(term.value())
    } else {
        Err(SparqlError::Type(format!("{} is not a string literal", term)))
    }
}

/// Literal with the same language tag as `like`
fn string_like(like: &TermDescriptor, value: String) -> TermDescriptor {
    match like.lang() {
        Some(lang) => TermDescriptor::lang_literal(value, lang),
        None => TermDescriptor::simple_literal(value),
    }
}

/// Effective boolean value of a term
pub(super) fn effective_boolean(term: &TermDescriptor) -> SparqlResult<bool> {
    match term.datatype() {
        Some(XSD_BOOLEAN) => Ok(matches!(term.value(), "true" | "1")),
        Some(dt) if is_numeric_type(dt) => Ok(numeric(term).is_some_and(|n| n != 0.0 && !n.is_nan())),
        Some(_) if is_string(term) || term.lang().is_some() => Ok(!term.value().is_empty()),
        _ => Err(SparqlError::Type(format!("no effective boolean value for {}", term))),
    }
}

/// Total order used by ORDER BY: unbound, blank nodes, IRIs, literals
pub(super) fn compare_terms(a: Option<&TermDescriptor>, b: Option<&TermDescriptor>) -> Ordering {
    fn rank(term: Option<&TermDescriptor>) -> u8 {
        match term {
            None => 0,
            Some(TermDescriptor::Blank(_)) => 1,
            Some(TermDescriptor::Uri(_)) => 2,
            Some(TermDescriptor::Literal { .. }) => 3,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) if x.is_literal() && y.is_literal() => {
            if let (Some(m), Some(n)) = (numeric(x), numeric(y)) {
                return m.partial_cmp(&n).unwrap_or(Ordering::Equal);
            }
            x.value().cmp(y.value()).then_with(|| x.cmp(y))
        }
        (Some(x), Some(y)) if rank(a) == rank(b) => x.value().cmp(y.value()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Value equality of `=`
fn equal(a: &TermDescriptor, b: &TermDescriptor) -> SparqlResult<bool> {
    if let (Some(m), Some(n)) = (numeric(a), numeric(b)) {
        return Ok(m == n);
    }
    if a == b {
        return Ok(true);
    }
    match (a, b) {
        (TermDescriptor::Literal { .. }, TermDescriptor::Literal { .. }) => {
            let comparable = (is_string(a) && is_string(b)) || a.datatype() == b.datatype();
            if comparable {
                Ok(false)
            } else {
                Err(SparqlError::Type(format!("cannot compare {} and {}", a, b)))
            }
        }
        _ => Ok(false),
    }
}

/// Ordering of `<`, `>` and friends
fn ordering(a: &TermDescriptor, b: &TermDescriptor) -> SparqlResult<Ordering> {
    if let (Some(m), Some(n)) = (numeric(a), numeric(b)) {
        return m
            .partial_cmp(&n)
            .ok_or_else(|| SparqlError::Type("NaN comparison".to_string()));
    }
    let comparable = a.is_literal()
        && b.is_literal()
        && a.lang() == b.lang()
        && a.datatype() == b.datatype();
    if comparable {
        Ok(a.value().cmp(b.value()))
    } else {
        Err(SparqlError::Type(format!("cannot order {} and {}", a, b)))
    }
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

fn arithmetic(op: Arithmetic, a: &TermDescriptor, b: &TermDescriptor) -> SparqlResult<TermDescriptor> {
    if let (Some(m), Some(n), false) = (integer(a), integer(b), matches!(op, Arithmetic::Divide)) {
        let value = match op {
            Arithmetic::Add => m.checked_add(n),
            Arithmetic::Subtract => m.checked_sub(n),
            Arithmetic::Multiply => m.checked_mul(n),
            Arithmetic::Divide => None,
        }
        .ok_or_else(|| SparqlError::Execution("integer overflow".to_string()))?;
        return Ok(TermDescriptor::typed_literal(value.to_string(), XSD_INTEGER));
    }

    let (Some(m), Some(n)) = (numeric(a), numeric(b)) else {
        return Err(SparqlError::Type(format!("non-numeric operands {} and {}", a, b)));
    };
    let value = match op {
        Arithmetic::Add => m + n,
        Arithmetic::Subtract => m - n,
        Arithmetic::Multiply => m * n,
        Arithmetic::Divide => {
            if n == 0.0 {
                return Err(SparqlError::Execution("division by zero".to_string()));
            }
            m / n
        }
    };
    let is_double = [a, b]
        .iter()
        .any(|t| matches!(t.datatype().and_then(xsd_local), Some("double") | Some("float")));
    let datatype = if is_double { XSD_DOUBLE } else { XSD_DECIMAL };
    Ok(TermDescriptor::typed_literal(value.to_string(), datatype))
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let tag = tag.to_ascii_lowercase();
    let range = range.to_ascii_lowercase();
    tag == range || tag.strip_prefix(&range).is_some_and(|rest| rest.starts_with('-'))
}

impl<'a> Evaluator<'a> {
    /// Effective boolean value of an expression under one solution
    pub(super) fn ebv(&self, expr: &Expression, solution: &Solution, active: &ActiveGraph) -> SparqlResult<bool> {
        match expr {
            Expression::And(a, b) => {
                let (x, y) = (self.ebv(a, solution, active), self.ebv(b, solution, active));
                match (x, y) {
                    (Ok(false), _) | (_, Ok(false)) => Ok(false),
                    (Ok(true), Ok(true)) => Ok(true),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
            Expression::Or(a, b) => {
                let (x, y) = (self.ebv(a, solution, active), self.ebv(b, solution, active));
                match (x, y) {
                    (Ok(true), _) | (_, Ok(true)) => Ok(true),
                    (Ok(false), Ok(false)) => Ok(false),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
            Expression::Not(inner) => Ok(!self.ebv(inner, solution, active)?),
            _ => effective_boolean(&self.eval_expr(expr, solution, active)?),
        }
    }

    /// Value of an expression under one solution
    pub(super) fn eval_expr(
        &self,
        expr: &Expression,
        solution: &Solution,
        active: &ActiveGraph,
    ) -> SparqlResult<TermDescriptor> {
        let eval = |e: &Expression| self.eval_expr(e, solution, active);

        match expr {
            Expression::NamedNode(n) => Ok(TermDescriptor::from_ox_named_node(n)),
            Expression::Literal(l) => Ok(TermDescriptor::from_ox_literal(l)),
            Expression::Variable(v) => solution
                .get(v.as_str())
                .cloned()
                .ok_or_else(|| SparqlError::Execution(format!("unbound variable ?{}", v.as_str()))),
            Expression::And(..) | Expression::Or(..) | Expression::Not(_) => {
                Ok(boolean(self.ebv(expr, solution, active)?))
            }
            Expression::Equal(a, b) => Ok(boolean(equal(&eval(a)?, &eval(b)?)?)),
            Expression::SameTerm(a, b) => Ok(boolean(eval(a)? == eval(b)?)),
            Expression::Greater(a, b) => Ok(boolean(ordering(&eval(a)?, &eval(b)?)? == Ordering::Greater)),
            Expression::GreaterOrEqual(a, b) => {
                Ok(boolean(ordering(&eval(a)?, &eval(b)?)? != Ordering::Less))
            }
            Expression::Less(a, b) => Ok(boolean(ordering(&eval(a)?, &eval(b)?)? == Ordering::Less)),
            Expression::LessOrEqual(a, b) => {
                Ok(boolean(ordering(&eval(a)?, &eval(b)?)? != Ordering::Greater))
            }
            Expression::In(needle, haystack) => {
                let needle = eval(needle)?;
                let found = haystack
                    .iter()
                    .any(|e| eval(e).and_then(|v| equal(&needle, &v)).unwrap_or(false));
                Ok(boolean(found))
            }
            Expression::Add(a, b) => arithmetic(Arithmetic::Add, &eval(a)?, &eval(b)?),
            Expression::Subtract(a, b) => arithmetic(Arithmetic::Subtract, &eval(a)?, &eval(b)?),
            Expression::Multiply(a, b) => arithmetic(Arithmetic::Multiply, &eval(a)?, &eval(b)?),
            Expression::Divide(a, b) => arithmetic(Arithmetic::Divide, &eval(a)?, &eval(b)?),
            Expression::UnaryPlus(inner) => {
                let value = eval(inner)?;
                numeric(&value)
                    .map(|_| value.clone())
                    .ok_or_else(|| SparqlError::Type(format!("{} is not numeric", value)))
            }
            Expression::UnaryMinus(inner) => {
                let zero = TermDescriptor::typed_literal("0", XSD_INTEGER);
                arithmetic(Arithmetic::Subtract, &zero, &eval(inner)?)
            }
            Expression::Exists(pattern) => {
                let found = self
                    .eval(pattern, active)?
                    .iter()
                    .any(|candidate| compatible(solution, candidate));
                Ok(boolean(found))
            }
            Expression::Bound(v) => Ok(boolean(solution.contains_key(v.as_str()))),
            Expression::If(condition, then, otherwise) => {
                if self.ebv(condition, solution, active)? {
                    eval(then)
                } else {
                    eval(otherwise)
                }
            }
            Expression::Coalesce(options) => options
                .iter()
                .find_map(|e| eval(e).ok())
                .ok_or_else(|| SparqlError::Execution("COALESCE without a value".to_string())),
            Expression::FunctionCall(function, args) => {
                let args = args.iter().map(eval).collect::<SparqlResult<Vec<_>>>()?;
                call(function, &args)
            }
            #[allow(unreachable_patterns)]
            _ => Err(SparqlError::Unsupported("expression".to_string())),
        }
    }
}

fn arg(args: &[TermDescriptor], i: usize) -> SparqlResult<&TermDescriptor> {
    args.get(i)
        .ok_or_else(|| SparqlError::Execution(format!("missing argument {}", i + 1)))
}

fn call(function: &Function, args: &[TermDescriptor]) -> SparqlResult<TermDescriptor> {
    match function {
        Function::Str => match arg(args, 0)? {
            TermDescriptor::Blank(_) => Err(SparqlError::Type("STR of a blank node".to_string())),
            term => Ok(TermDescriptor::simple_literal(term.value())),
        },
        Function::Lang => match arg(args, 0)? {
            term @ TermDescriptor::Literal { .. } => {
                Ok(TermDescriptor::simple_literal(term.lang().unwrap_or("")))
            }
            term => Err(SparqlError::Type(format!("LANG of {}", term))),
        },
        Function::LangMatches => {
            let tag = string_arg(arg(args, 0)?)?;
            let range = string_arg(arg(args, 1)?)?;
            Ok(boolean(lang_matches(tag, range)))
        }
        Function::Datatype => arg(args, 0)?
            .datatype()
            .map(TermDescriptor::uri)
            .ok_or_else(|| SparqlError::Type("DATATYPE of a non-literal".to_string())),
        Function::IsIri => Ok(boolean(arg(args, 0)?.is_uri())),
        Function::IsBlank => Ok(boolean(arg(args, 0)?.is_blank())),
        Function::IsLiteral => Ok(boolean(arg(args, 0)?.is_literal())),
        Function::IsNumeric => Ok(boolean(numeric(arg(args, 0)?).is_some())),
        Function::StrLen => {
            let value = string_arg(arg(args, 0)?)?;
            Ok(TermDescriptor::typed_literal(value.chars().count().to_string(), XSD_INTEGER))
        }
        Function::UCase => {
            let term = arg(args, 0)?;
            Ok(string_like(term, string_arg(term)?.to_uppercase()))
        }
        Function::LCase => {
            let term = arg(args, 0)?;
            Ok(string_like(term, string_arg(term)?.to_lowercase()))
        }
        Function::Contains => {
            let (haystack, needle) = (string_arg(arg(args, 0)?)?, string_arg(arg(args, 1)?)?);
            Ok(boolean(haystack.contains(needle)))
        }
        Function::StrStarts => {
            let (haystack, needle) = (string_arg(arg(args, 0)?)?, string_arg(arg(args, 1)?)?);
            Ok(boolean(haystack.starts_with(needle)))
        }
        Function::StrEnds => {
            let (haystack, needle) = (string_arg(arg(args, 0)?)?, string_arg(arg(args, 1)?)?);
            Ok(boolean(haystack.ends_with(needle)))
        }
        Function::Concat => {
            let mut value = String::new();
            for term in args {
                value.push_str(string_arg(term)?);
            }
            Ok(TermDescriptor::simple_literal(value))
        }
        Function::Regex => {
            let text = string_arg(arg(args, 0)?)?;
            let pattern = string_arg(arg(args, 1)?)?;
            let flags = match args.get(2) {
                Some(flags) => string_arg(flags)?,
                None => "",
            };
            let mut builder = RegexBuilder::new(pattern);
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    's' => builder.dot_matches_new_line(true),
                    'm' => builder.multi_line(true),
                    'x' => builder.ignore_whitespace(true),
                    other => return Err(SparqlError::Execution(format!("unknown regex flag '{}'", other))),
                };
            }
            let regex = builder
                .build()
                .map_err(|e| SparqlError::Execution(format!("invalid regex: {}", e)))?;
            Ok(boolean(regex.is_match(text)))
        }
        other => Err(SparqlError::Unsupported(format!("function {:?}", other))),
    }
}
