//! The drawing-program DSL: `function setup { ... }` / `function draw
//! { ... }` blocks of call statements over arithmetic expressions.
//!
//! Programs arrive as text (from the remote generator or the local
//! templates) and are parsed into a statement tree here. The executor
//! interprets that tree against its own drawing surface, so generated code
//! can only ever reach the whitelisted primitives — there is no textual
//! rewriting of identifiers and no ambient global to escape to.

pub mod validate;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Arithmetic over literals and the three frame-environment readouts.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    FrameCount,
    Width,
    Height,
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Values visible to expressions during one frame.
#[derive(Debug, Clone, Copy)]
pub struct EvalEnv {
    pub frame_count: f64,
    pub width: f64,
    pub height: f64,
}

impl Expr {
    pub fn eval(&self, env: &EvalEnv) -> f64 {
        match self {
            Expr::Number(value) => *value,
            Expr::FrameCount => env.frame_count,
            Expr::Width => env.width,
            Expr::Height => env.height,
            Expr::Neg(inner) => -inner.eval(env),
            Expr::Binary { op, left, right } => {
                let lhs = left.eval(env);
                let rhs = right.eval(env);
                match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                }
            }
        }
    }
}

/// One call argument: a numeric expression or a bare mode keyword
/// (`CENTER` in `rectMode(CENTER)`).
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Expr),
    Mode(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

/// A parsed drawing program: the one-shot setup block and the repeating
/// draw block. Either block may be absent in the source text; the
/// executor substitutes defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SketchProgram {
    pub setup: Option<Vec<Call>>,
    pub draw: Option<Vec<Call>>,
}

impl SketchProgram {
    pub fn parse(code: &str) -> Result<Self> {
        let source = strip_block_comments(code);
        let setup = extract_block(&source, "function setup")?
            .map(|block| parse_statements(&block))
            .transpose()
            .context("in setup block")?;
        let draw = extract_block(&source, "function draw")?
            .map(|block| parse_statements(&block))
            .transpose()
            .context("in draw block")?;
        Ok(Self { setup, draw })
    }
}

fn strip_block_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

// Body of the first brace-block following `header`, or None when the
// header never appears.
fn extract_block(code: &str, header: &str) -> Result<Option<String>> {
    let Some(at) = code.find(header) else {
        return Ok(None);
    };
    let after = &code[at..];
    let open = after
        .find('{')
        .with_context(|| format!("`{header}` has no body"))?;
    let mut depth = 0usize;
    for (offset, ch) in after[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let body = &after[open + 1..open + offset];
                    return Ok(Some(body.to_string()));
                }
            }
            _ => {}
        }
    }
    bail!("unbalanced braces after `{header}`");
}

fn parse_statements(block: &str) -> Result<Vec<Call>> {
    let block = strip_line_comments(block);
    block
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(parse_call)
        .collect()
}

// Line comments end at the newline, not at the next `;`, so they must go
// before statements are split.
fn strip_line_comments(block: &str) -> String {
    block
        .lines()
        .map(|line| line.split_once("//").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_call(stmt: &str) -> Result<Call> {
    let open = stmt
        .find('(')
        .with_context(|| format!("malformed statement `{stmt}`"))?;
    let name = stmt[..open].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        bail!("malformed call name in `{stmt}`");
    }
    let close = stmt
        .rfind(')')
        .with_context(|| format!("unterminated call `{stmt}`"))?;
    let args = split_args(&stmt[open + 1..close])
        .into_iter()
        .map(|raw| parse_arg(&raw))
        .collect::<Result<Vec<Arg>>>()
        .with_context(|| format!("in call `{name}`"))?;
    Ok(Call {
        name: name.to_string(),
        args,
    })
}

fn split_args(src: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in src.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let last = current.trim().to_string();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_arg(raw: &str) -> Result<Arg> {
    // Bare uppercase identifiers are mode keywords, not expressions.
    if !raw.is_empty()
        && raw.chars().all(|ch| ch.is_ascii_uppercase() || ch == '_')
    {
        return Ok(Arg::Mode(raw.to_string()));
    }
    parse_expression(raw).map(Arg::Value)
}

/// Parse a single arithmetic expression.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        bail!("trailing input in expression `{src}`");
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ if ch.is_ascii_digit() || ch == '.' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
                {
                    i += 1;
                }
                let number = src[start..i]
                    .parse::<f64>()
                    .with_context(|| format!("bad number in `{src}`"))?;
                tokens.push(Token::Number(number));
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(src[start..i].to_string()));
            }
            _ => bail!("unexpected character `{ch}` in expression `{src}`"),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => match name.as_str() {
                "frameCount" => Ok(Expr::FrameCount),
                "width" => Ok(Expr::Width),
                "height" => Ok(Expr::Height),
                _ => bail!("unknown identifier `{name}`"),
            },
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => bail!("missing closing parenthesis"),
                }
            }
            other => bail!("unexpected token {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_expression, Arg, EvalEnv, Expr, SketchProgram};

    fn env(frame_count: f64) -> EvalEnv {
        EvalEnv {
            frame_count,
            width: 800.0,
            height: 600.0,
        }
    }

    #[test]
    fn expression_evaluates_frame_counter() {
        let expr = parse_expression("frameCount * 0.05").unwrap();
        assert_eq!(expr.eval(&env(0.0)), 0.0);
        assert_eq!(expr.eval(&env(10.0)), 0.5);
    }

    #[test]
    fn expression_precedence_and_grouping() {
        assert_eq!(
            parse_expression("width / 2 - 10").unwrap().eval(&env(0.0)),
            390.0
        );
        assert_eq!(
            parse_expression("(1 + 2) * -3").unwrap().eval(&env(0.0)),
            -9.0
        );
        assert_eq!(
            parse_expression("height / 2 + 60").unwrap().eval(&env(0.0)),
            360.0
        );
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        assert!(parse_expression("mouseIsPressed + 1").is_err());
    }

    #[test]
    fn parse_extracts_setup_and_draw_blocks() {
        let code = "function setup() {\n  createCanvas(800, 600);\n}\n\n\
                    function draw() {\n  background(240, 240, 240);\n  fill(255, 80, 80);\n  ellipse(400, 300, 150, 150);\n}";
        let program = SketchProgram::parse(code).unwrap();
        let setup = program.setup.unwrap();
        assert_eq!(setup.len(), 1);
        assert_eq!(setup[0].name, "createCanvas");
        let draw = program.draw.unwrap();
        assert_eq!(draw.len(), 3);
        assert_eq!(draw[0].name, "background");
        assert_eq!(draw[2].name, "ellipse");
        assert_eq!(draw[2].args.len(), 4);
    }

    #[test]
    fn missing_blocks_parse_as_none() {
        let program = SketchProgram::parse("function draw() { background(240); }").unwrap();
        assert!(program.setup.is_none());
        assert!(program.draw.is_some());
    }

    #[test]
    fn mode_keywords_are_kept_verbatim() {
        let program =
            SketchProgram::parse("function draw() { rectMode(CENTER); rect(0, 0, 10, 10); }")
                .unwrap();
        let draw = program.draw.unwrap();
        assert_eq!(draw[0].args, vec![Arg::Mode("CENTER".to_string())]);
    }

    #[test]
    fn line_comment_ends_at_the_newline() {
        let code = "function draw() {\n  fill(255, 0, 0); // set the color\n  ellipse(400, 300, 150, 150);\n}";
        let draw = SketchProgram::parse(code).unwrap().draw.unwrap();
        assert_eq!(draw.len(), 2);
        assert_eq!(draw[0].name, "fill");
        assert_eq!(draw[1].name, "ellipse");
    }

    #[test]
    fn whole_line_comments_are_dropped() {
        let code = "function draw() {\n  // background(0);\n  background(240);\n}";
        let draw = SketchProgram::parse(code).unwrap().draw.unwrap();
        assert_eq!(draw.len(), 1);
        assert_eq!(draw[0].name, "background");
    }

    #[test]
    fn block_comments_are_ignored() {
        let program =
            SketchProgram::parse("function draw() { /* executed in setup */ }").unwrap();
        assert_eq!(program.draw.unwrap().len(), 0);
    }

    #[test]
    fn multiline_statements_parse() {
        let code = "function draw() {\n  triangle(400, 225,\n           325, 375,\n           475, 375);\n}";
        let draw = SketchProgram::parse(code).unwrap().draw.unwrap();
        assert_eq!(draw[0].name, "triangle");
        assert_eq!(draw[0].args.len(), 6);
    }

    #[test]
    fn unbalanced_braces_are_an_error() {
        assert!(SketchProgram::parse("function setup() { createCanvas(1, 1);").is_err());
    }

    #[test]
    fn negative_coordinates_parse() {
        let code = "function draw() { line(-75, 0, 75, 0); }";
        let draw = SketchProgram::parse(code).unwrap().draw.unwrap();
        match &draw[0].args[0] {
            Arg::Value(expr) => assert_eq!(expr.eval(&env(0.0)), -75.0),
            other => panic!("expected value arg, got {other:?}"),
        }
    }
}
