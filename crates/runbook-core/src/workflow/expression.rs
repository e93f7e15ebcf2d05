//! Condition evaluator for step guards.
//!
//! A condition that starts with `$` is a single variable lookup: everything
//! after the `$` names a context entry, tested for truthiness. Any other
//! condition is a boolean expression in a small closed grammar:
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in") operand)?
//! operand := number | string | true | false | null | True | False | None
//!          | ["$"] ident ("." ident)* | "(" expr ")"
//! ```
//!
//! The run context is the only symbol table. There are no function calls,
//! no arithmetic and no attribute access beyond object keys.
//!
//! **Fail-open:** `evaluate_condition` treats any parse or evaluation error
//! as `true` and logs a warning, so a broken guard never silently skips work.

use serde_json::{Number, Value};

use super::context::RunContext;

/// Maximum nesting of `not` and parentheses.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Maximum number of `and`/`or` operators in one expression.
pub const MAX_EXPRESSION_OPERATORS: usize = 256;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing or evaluating a condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("expression nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("expression has more than {0} boolean operators")]
    TooManyOperators(usize),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Decide whether a guarded step should run. Never fails.
///
/// Empty conditions run the step. A condition starting with `$` looks the
/// rest of the string up in the context (exact key, then dotted path) and
/// returns its truthiness, with a missing variable counting as false. It is
/// never parsed as an expression. Anything else goes through the grammar.
pub fn evaluate_condition(condition: &str, context: &RunContext) -> bool {
    let trimmed = condition.trim();
    if trimmed.is_empty() {
        return true;
    }

    if let Some(reference) = trimmed.strip_prefix('$') {
        return context.resolve(reference).is_some_and(value_to_bool);
    }

    match try_evaluate_condition(trimmed, context) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                condition = trimmed,
                error = %e,
                "condition could not be evaluated, running step"
            );
            true
        }
    }
}

/// Parse and evaluate an expression, coercing the result to a boolean.
pub fn try_evaluate_condition(
    expression: &str,
    context: &RunContext,
) -> Result<bool, ExpressionError> {
    let parsed = Expression::parse(expression)?;
    let value = parsed.evaluate(context)?;
    Ok(value_to_bool(&value))
}

/// Coerce a JSON value to boolean.
///
/// `null`, `false`, zero, the empty string, the empty array and the empty
/// object are false. Everything else is true.
pub fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A parsed condition expression, reusable across contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            operators: 0,
        };
        let root = parser.parse_or()?;
        if let Some((token, pos)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::UnexpectedToken {
                found: token.describe(),
                pos: *pos,
            });
        }
        Ok(Self { root })
    }

    /// Evaluate to a raw JSON value. `and`/`or`/`not` and comparisons yield
    /// booleans; a lone operand yields its own value.
    pub fn evaluate(&self, context: &RunContext) -> Result<Value, ExpressionError> {
        eval(&self.root, context)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Dollar,
    Dot,
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    Cmp(CompareOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Ident(i) => format!("identifier '{i}'"),
            Token::Dollar => "'$'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::In => "'in'".to_string(),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::Cmp(op) => format!("'{}'", op.symbol()),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '.' => {
                tokens.push((Token::Dot, start));
                i += 1;
            }
            '$' => {
                tokens.push((Token::Dollar, start));
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push((Token::Cmp(CompareOp::Eq), start));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((Token::Cmp(CompareOp::Ne), start));
                i += 2;
            }
            '!' => {
                tokens.push((Token::Not, start));
                i += 1;
            }
            '<' | '>' => {
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    _ => (CompareOp::Gt, 1),
                };
                tokens.push((Token::Cmp(op), start));
                i += width;
            }
            '&' if next == Some('&') => {
                tokens.push((Token::And, start));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((Token::Or, start));
                i += 2;
            }
            '"' | '\'' => {
                let (s, end) = lex_string(&chars, start)?;
                tokens.push((Token::Str(s), start));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let (n, end) = lex_number(&chars, start)?;
                tokens.push((Token::Number(n), start));
                i = end;
            }
            '-' if next.is_some_and(|d| d.is_ascii_digit()) => {
                let (n, end) = lex_number(&chars, start)?;
                tokens.push((Token::Number(n), start));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push((token, start));
                i = end;
            }
            other => {
                return Err(ExpressionError::UnexpectedChar {
                    ch: other,
                    pos: start,
                });
            }
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or(ExpressionError::UnterminatedString(start))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExpressionError::UnterminatedString(start))
}

fn lex_number(chars: &[char], start: usize) -> Result<(Number, usize), ExpressionError> {
    let mut end = start;
    if chars[end] == '-' {
        end += 1;
    }
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    let mut is_float = false;
    if end + 1 < chars.len() && chars[end] == '.' && chars[end + 1].is_ascii_digit() {
        is_float = true;
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }
    let text: String = chars[start..end].iter().collect();
    let number = if is_float {
        text.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        text.parse::<i64>().ok().map(Number::from)
    };
    number
        .map(|n| (n, end))
        .ok_or(ExpressionError::InvalidNumber(text))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Result<(Token, usize), ExpressionError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_EXPRESSION_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Count one `and`/`or`. Chains nest left, so this bounds tree depth.
    fn count_operator(&mut self) -> Result<(), ExpressionError> {
        self.operators += 1;
        if self.operators > MAX_EXPRESSION_OPERATORS {
            return Err(ExpressionError::TooManyOperators(MAX_EXPRESSION_OPERATORS));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.count_operator()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.count_operator()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_operand()?;
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Cmp(op)), _) => {
                let op = *op;
                self.pos += 1;
                op
            }
            (Some(Token::In), _) => {
                self.pos += 1;
                CompareOp::In
            }
            (Some(Token::Not), Some(Token::In)) => {
                self.pos += 2;
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        let right = self.parse_operand()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, ExpressionError> {
        let (token, pos) = self.advance()?;
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Dollar => match self.advance()? {
                (Token::Ident(first), _) => self.parse_path(first),
                (other, pos) => Err(ExpressionError::UnexpectedToken {
                    found: other.describe(),
                    pos,
                }),
            },
            Token::Ident(first) => self.parse_path(first),
            Token::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                match self.advance()? {
                    (Token::RParen, _) => Ok(inner),
                    (other, pos) => Err(ExpressionError::UnexpectedToken {
                        found: other.describe(),
                        pos,
                    }),
                }
            }
            other => Err(ExpressionError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }

    fn parse_path(&mut self, first: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![first];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.advance()? {
                (Token::Ident(segment), _) => segments.push(segment),
                (other, pos) => {
                    return Err(ExpressionError::UnexpectedToken {
                        found: other.describe(),
                        pos,
                    });
                }
            }
        }
        Ok(Expr::Var(segments))
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, context: &RunContext) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(segments) => context
            .lookup_path(segments)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownIdentifier(segments.join("."))),
        Expr::Not(inner) => Ok(Value::Bool(!value_to_bool(&eval(inner, context)?))),
        Expr::And(left, right) => {
            if !value_to_bool(&eval(left, context)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(value_to_bool(&eval(right, context)?)))
        }
        Expr::Or(left, right) => {
            if value_to_bool(&eval(left, context)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(value_to_bool(&eval(right, context)?)))
        }
        Expr::Compare { op, left, right } => {
            let l = eval(left, context)?;
            let r = eval(right, context)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::In => contains(right, left, op),
        CompareOp::NotIn => contains(right, left, op).map(|found| !found),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                    a.partial_cmp(&b)
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let ordering = ordering.ok_or(ExpressionError::TypeMismatch {
                op: op.symbol(),
                left: type_name(left),
                right: type_name(right),
            })?;
            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn contains(haystack: &Value, needle: &Value, op: CompareOp) -> Result<bool, ExpressionError> {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => Ok(h.contains(n.as_str())),
        (Value::Array(items), n) => Ok(items.iter().any(|item| values_equal(item, n))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(ExpressionError::TypeMismatch {
            op: op.symbol(),
            left: type_name(needle),
            right: type_name(haystack),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> RunContext {
        match value {
            Value::Object(map) => RunContext::new(map),
            _ => panic!("context must be an object"),
        }
    }

    fn eval_ok(expr: &str, context: &RunContext) -> bool {
        try_evaluate_condition(expr, context).unwrap()
    }

    // -------------------------------------------------------------------
    // $variable shortcut
    // -------------------------------------------------------------------

    #[test]
    fn test_dollar_reference_truthiness() {
        let c = ctx(json!({
            "yes": true, "no": false, "zero": 0, "one": 1,
            "empty": "", "text": "x", "list": [], "full": [1],
            "obj": {}, "nil": null
        }));
        assert!(evaluate_condition("$yes", &c));
        assert!(evaluate_condition("$one", &c));
        assert!(evaluate_condition("$text", &c));
        assert!(evaluate_condition("$full", &c));
        assert!(!evaluate_condition("$no", &c));
        assert!(!evaluate_condition("$zero", &c));
        assert!(!evaluate_condition("$empty", &c));
        assert!(!evaluate_condition("$list", &c));
        assert!(!evaluate_condition("$obj", &c));
        assert!(!evaluate_condition("$nil", &c));
    }

    #[test]
    fn test_dollar_reference_missing_is_false() {
        assert!(!evaluate_condition("$flag", &RunContext::default()));
    }

    #[test]
    fn test_dollar_reference_dotted_path() {
        let c = ctx(json!({"fetch": {"ok": true}}));
        assert!(evaluate_condition("$fetch.ok", &c));
        assert!(!evaluate_condition("$fetch.missing", &c));
    }

    #[test]
    fn test_dollar_condition_is_never_parsed() {
        let empty = RunContext::default();
        assert!(!evaluate_condition("$count > 3", &empty));
        assert!(!evaluate_condition("$my flag", &empty));

        let c = ctx(json!({"my flag": "yes"}));
        assert!(evaluate_condition("$my flag", &c));
    }

    #[test]
    fn test_empty_condition_runs() {
        assert!(evaluate_condition("   ", &RunContext::default()));
    }

    // -------------------------------------------------------------------
    // Grammar
    // -------------------------------------------------------------------

    #[test]
    fn test_comparisons() {
        let c = ctx(json!({"count": 5, "status": "ok"}));
        assert!(eval_ok("count > 3", &c));
        assert!(eval_ok("count >= 5", &c));
        assert!(!eval_ok("count < 5", &c));
        assert!(eval_ok("count <= 5.0", &c));
        assert!(eval_ok("count == 5.0", &c));
        assert!(eval_ok("status == 'ok'", &c));
        assert!(eval_ok("status != \"fail\"", &c));
        assert!(eval_ok("$count > -1", &c));
        assert!(eval_ok("'abc' < 'abd'", &c));
    }

    #[test]
    fn test_boolean_keywords_and_symbols() {
        let c = ctx(json!({"a": true, "b": false}));
        assert!(eval_ok("a and not b", &c));
        assert!(eval_ok("a && !b", &c));
        assert!(eval_ok("b or a", &c));
        assert!(eval_ok("b || a", &c));
        assert!(!eval_ok("not (a or b)", &c));
        assert!(eval_ok("True and not False", &c));
        assert!(eval_ok("None == null", &c));
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let c = ctx(json!({"t": true, "f": false}));
        // t or (f and f)
        assert!(eval_ok("t or f and f", &c));
        // (f and t) or f
        assert!(!eval_ok("f and t or f", &c));
    }

    #[test]
    fn test_membership() {
        let c = ctx(json!({
            "msg": "deploy finished",
            "tags": ["prod", "eu"],
            "env": {"region": "eu"}
        }));
        assert!(eval_ok("'finished' in msg", &c));
        assert!(eval_ok("'prod' in tags", &c));
        assert!(eval_ok("'us' not in tags", &c));
        assert!(eval_ok("'region' in env", &c));
        assert!(!eval_ok("'zone' in env", &c));
    }

    #[test]
    fn test_nested_path() {
        let c = ctx(json!({"fetch": {"body": {"status": 200}}}));
        assert!(eval_ok("fetch.body.status == 200", &c));
        assert!(eval_ok("$fetch.body.status == 200", &c));
    }

    #[test]
    fn test_short_circuit_skips_unknown_identifier() {
        let c = ctx(json!({"f": false, "t": true}));
        assert!(!eval_ok("f and missing", &c));
        assert!(eval_ok("t or missing", &c));
    }

    #[test]
    fn test_lone_operand_truthiness() {
        let c = ctx(json!({"items": []}));
        assert!(!eval_ok("items", &c));
        assert!(eval_ok("not items", &c));
    }

    #[test]
    fn test_string_escapes() {
        let c = ctx(json!({"s": "it's"}));
        assert!(eval_ok(r"s == 'it\'s'", &c));
    }

    // -------------------------------------------------------------------
    // Errors and fail-open
    // -------------------------------------------------------------------

    #[test]
    fn test_unknown_identifier_is_error() {
        let err = try_evaluate_condition("missing == 1", &RunContext::default()).unwrap_err();
        assert_eq!(err, ExpressionError::UnknownIdentifier("missing".to_string()));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let c = ctx(json!({"n": 1}));
        let err = try_evaluate_condition("n < 'x'", &c).unwrap_err();
        assert!(matches!(err, ExpressionError::TypeMismatch { op: "<", .. }));
    }

    #[test]
    fn test_rejects_calls_and_arithmetic() {
        let c = ctx(json!({"n": 1}));
        assert!(try_evaluate_condition("__import__('os')", &c).is_err());
        assert!(try_evaluate_condition("n + 1 > 1", &c).is_err());
        assert!(try_evaluate_condition("n = 1", &c).is_err());
        assert!(try_evaluate_condition("n < 2 < 3", &c).is_err());
        assert!(try_evaluate_condition("(n == 1", &c).is_err());
        assert!(try_evaluate_condition("'open", &c).is_err());
    }

    #[test]
    fn test_fail_open_on_error() {
        let c = ctx(json!({"n": 1}));
        assert!(evaluate_condition("n +", &c));
        assert!(evaluate_condition("missing > 3", &c));
        assert!(evaluate_condition("exec('rm -rf /')", &c));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        let err = Expression::parse(&deep).unwrap_err();
        assert_eq!(err, ExpressionError::TooDeep(MAX_EXPRESSION_DEPTH));
    }

    #[test]
    fn test_long_boolean_chain_is_rejected() {
        let c = ctx(json!({"a": true}));
        let chain = vec!["a"; 200_000].join(" and ");
        let err = try_evaluate_condition(&chain, &c).unwrap_err();
        assert_eq!(err, ExpressionError::TooManyOperators(MAX_EXPRESSION_OPERATORS));
        assert!(evaluate_condition(&chain, &c));

        let mixed = vec!["a"; 100_000].join(" or ");
        assert!(try_evaluate_condition(&mixed, &c).is_err());
    }

    #[test]
    fn test_chain_within_operator_limit_evaluates() {
        let c = ctx(json!({"a": true}));
        let chain = vec!["a"; MAX_EXPRESSION_OPERATORS + 1].join(" and ");
        assert!(eval_ok(&chain, &c));
    }

    #[test]
    fn test_parsed_expression_is_reusable() {
        let expr = Expression::parse("count > 1").unwrap();
        assert_eq!(expr.evaluate(&ctx(json!({"count": 2}))).unwrap(), json!(true));
        assert_eq!(expr.evaluate(&ctx(json!({"count": 0}))).unwrap(), json!(false));
    }
}
