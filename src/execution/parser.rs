//! Recursive-descent parser for the snippet dialect. Precedence follows the
//! Python operators it borrows: `or < and < not < comparison < | < & < + - < * / // % < unary < **`.

use crate::execution::lexer::{tokenize, Spanned, Token};
use crate::execution::SnippetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign(String, Expr),
    Import(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

impl Stmt {
    pub fn is_expression(&self) -> bool {
        matches!(self.kind, StmtKind::Expr(_))
    }
}

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "def", "class", "lambda", "for", "while", "if", "else", "elif", "with", "try", "except",
    "return", "yield", "global", "nonlocal", "del", "raise", "assert", "exec", "eval", "async",
    "await",
];

/// Deepest expression nesting accepted, counting brackets, unary operators and
/// operator chains. Keeps parsing and evaluation off the end of the stack.
pub const MAX_NESTING: usize = 64;

pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SnippetError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut statements = Vec::new();
    while !parser.at_eof() {
        if parser.eat_newline() {
            continue;
        }
        statements.push(parser.statement()?);
    }
    Ok(statements)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn eat_newline(&mut self) -> bool {
        if matches!(self.peek(), Token::Newline) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SnippetError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' but found {}", op, describe(self.peek()))))
        }
    }

    fn descend(&mut self) -> Result<(), SnippetError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn error(&self, message: String) -> SnippetError {
        SnippetError::Syntax {
            line: self.line(),
            message,
        }
    }

    fn statement(&mut self) -> Result<Stmt, SnippetError> {
        let line = self.line();

        if let Token::Name(word) = self.peek().clone() {
            if word == "import" || word == "from" {
                let module = self.import_statement()?;
                return Ok(Stmt { kind: StmtKind::Import(module), line });
            }
            if UNSUPPORTED_KEYWORDS.contains(&word.as_str()) {
                return Err(self.error(format!("'{}' statements are not supported", word)));
            }
            if matches!(self.peek_at(1), Token::Op("=")) {
                self.advance();
                self.advance();
                let value = self.expression()?;
                self.end_of_statement()?;
                return Ok(Stmt { kind: StmtKind::Assign(word, value), line });
            }
        }

        let expr = self.expression()?;
        if self.is_op("=") {
            return Err(self.error("only plain names can be assigned to".to_string()));
        }
        self.end_of_statement()?;
        Ok(Stmt { kind: StmtKind::Expr(expr), line })
    }

    fn import_statement(&mut self) -> Result<String, SnippetError> {
        let mut module = match self.advance() {
            Token::Name(n) if n == "from" => n,
            _ => String::new(),
        };
        while !matches!(self.peek(), Token::Newline | Token::Eof) {
            let piece = match self.advance() {
                Token::Name(n) => n,
                Token::Op(o) => o.to_string(),
                other => describe(&other),
            };
            if !module.is_empty() && piece != "." && !module.ends_with('.') {
                module.push(' ');
            }
            module.push_str(&piece);
        }
        self.end_of_statement()?;
        Ok(module)
    }

    fn end_of_statement(&mut self) -> Result<(), SnippetError> {
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            other => Err(self.error(format!("unexpected {}", describe(other)))),
        }
    }

    fn expression(&mut self) -> Result<Expr, SnippetError> {
        self.descend()?;
        let expr = self.or_expr()?;
        self.ascend(1);
        Ok(expr)
    }

    fn or_expr(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat_keyword("or") {
            self.descend()?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat_keyword("and") {
            self.descend()?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, SnippetError> {
        if self.eat_keyword("not") {
            self.descend()?;
            let operand = self.not_expr()?;
            self.ascend(1);
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SnippetError> {
        let left = self.bit_or()?;
        let (op, width) = match (self.peek(), self.peek_at(1)) {
            (Token::Op("=="), _) => (CmpOp::Eq, 1),
            (Token::Op("!="), _) => (CmpOp::NotEq, 1),
            (Token::Op("<"), _) => (CmpOp::Lt, 1),
            (Token::Op("<="), _) => (CmpOp::LtE, 1),
            (Token::Op(">"), _) => (CmpOp::Gt, 1),
            (Token::Op(">="), _) => (CmpOp::GtE, 1),
            (Token::Name(n), _) if n == "in" => (CmpOp::In, 1),
            (Token::Name(n), Token::Name(m)) if n == "not" && m == "in" => (CmpOp::NotIn, 2),
            _ => return Ok(left),
        };
        for _ in 0..width {
            self.advance();
        }
        let right = self.bit_or()?;
        if matches!(self.peek(), Token::Op("==" | "!=" | "<" | "<=" | ">" | ">=")) {
            return Err(self.error("chained comparisons are not supported".to_string()));
        }
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn bit_or(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.bit_and()?;
        let mut links = 0;
        while self.eat_op("|") {
            self.descend()?;
            links += 1;
            let right = self.bit_and()?;
            left = Expr::Binary(BinOp::BitOr, Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.arith()?;
        let mut links = 0;
        while self.eat_op("&") {
            self.descend()?;
            links += 1;
            let right = self.arith()?;
            left = Expr::Binary(BinOp::BitAnd, Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn arith(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinOp::Add,
                Token::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, SnippetError> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinOp::Mul,
                Token::Op("/") => BinOp::Div,
                Token::Op("//") => BinOp::FloorDiv,
                Token::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            links += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.ascend(links);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, SnippetError> {
        let op = match self.peek() {
            Token::Op("-") => UnaryOp::Neg,
            Token::Op("+") => UnaryOp::Pos,
            Token::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        self.descend()?;
        let operand = self.unary()?;
        self.ascend(1);
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, SnippetError> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            // right-associative, binds tighter than unary minus on the left
            self.descend()?;
            let exponent = self.unary()?;
            self.ascend(1);
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SnippetError> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Token::Op("." | "(" | "[")) {
                self.descend()?;
                links += 1;
            }
            if self.eat_op(".") {
                match self.advance() {
                    Token::Name(name) => expr = Expr::Attribute(Box::new(expr), name),
                    other => {
                        return Err(self.error(format!(
                            "expected attribute name after '.', found {}",
                            describe(&other)
                        )))
                    }
                }
            } else if self.eat_op("(") {
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op("[") {
                let index = self.subscript_index()?;
                self.expect_op("]")?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else {
                self.ascend(links);
                return Ok(expr);
            }
        }
    }

    fn subscript_index(&mut self) -> Result<Expr, SnippetError> {
        if self.is_op(":") {
            return Err(self.error("slices are not supported".to_string()));
        }
        let first = self.expression()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SnippetError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            let is_keyword_arg = matches!(self.peek(), Token::Name(_))
                && matches!(self.peek_at(1), Token::Op("="));
            if is_keyword_arg {
                let Token::Name(name) = self.advance() else {
                    return Err(self.error("expected keyword argument name".to_string()));
                };
                self.advance();
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument".to_string()));
                }
                args.push(self.expression()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, SnippetError> {
        let line = self.line();
        match self.advance() {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Float(v) => Ok(Expr::Float(v)),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    s.push_str(&next);
                }
                Ok(Expr::Str(s))
            }
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                word if UNSUPPORTED_KEYWORDS.contains(&word) => Err(SnippetError::Syntax {
                    line,
                    message: format!("'{}' is not supported", word),
                }),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op(")") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Token::Op("[") => {
                let items = self.sequence("]")?;
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                let mut pairs = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expression()?;
                    self.expect_op(":")?;
                    let value = self.expression()?;
                    pairs.push((key, value));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            other => Err(SnippetError::Syntax {
                line,
                message: format!("unexpected {}", describe(&other)),
            }),
        }
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>, SnippetError> {
        let mut items = Vec::new();
        while !self.eat_op(close) {
            items.push(self.expression()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                break;
            }
        }
        Ok(items)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(v) => format!("number {}", v),
        Token::Float(v) => format!("number {}", v),
        Token::Str(s) => format!("string '{}'", s),
        Token::Name(n) => format!("name '{}'", n),
        Token::Op(o) => format!("'{}'", o),
        Token::Newline => "end of line".to_string(),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> StmtKind {
        let mut program = parse_program(source).unwrap();
        assert_eq!(program.len(), 1, "expected one statement in {:?}", source);
        program.remove(0).kind
    }

    #[test]
    fn test_last_statement_kinds() {
        let program = parse_program("x = 1\nx").unwrap();
        assert_eq!(program.len(), 2);
        assert!(!program[0].is_expression());
        assert!(program[1].is_expression());
        assert_eq!(program[1].line, 2);
    }

    #[test]
    fn test_bitwise_binds_tighter_than_comparison() {
        // (a & b) == c, mirroring Python precedence
        match single("a & b == c") {
            StmtKind::Expr(Expr::Compare(CmpOp::Eq, left, _)) => {
                assert!(matches!(*left, Expr::Binary(BinOp::BitAnd, _, _)));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_method_chain_with_kwargs() {
        let kind = single("df.groupby('Payment Mode Name')['Refund Amount'].sum().reset_index(name='total')");
        match kind {
            StmtKind::Expr(Expr::Call { kwargs, .. }) => {
                assert_eq!(kwargs.len(), 1);
                assert_eq!(kwargs[0].0, "name");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_loc_tuple_index() {
        match single("df.loc[mask, 'Refund Amount']") {
            StmtKind::Expr(Expr::Subscript(_, index)) => {
                assert!(matches!(*index, Expr::Tuple(ref items) if items.len() == 2));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_power_and_unary_minus() {
        match single("-2 ** 2") {
            StmtKind::Expr(Expr::Unary(UnaryOp::Neg, inner)) => {
                assert!(matches!(*inner, Expr::Binary(BinOp::Pow, _, _)));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_import_is_parsed_not_rejected() {
        assert_eq!(single("import pandas as pd"), StmtKind::Import("pandas as pd".to_string()));
        assert_eq!(single("from os import path"), StmtKind::Import("from os import path".to_string()));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let shallow = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(single(&shallow), StmtKind::Expr(Expr::Int(1)));

        let chain = vec!["1"; 40].join(" + ");
        assert!(parse_program(&chain).is_ok());

        for deep in [
            format!("{}1{}", "(".repeat(1000), ")".repeat(1000)),
            format!("{}1{}", "[".repeat(1000), "]".repeat(1000)),
            format!("{}1", "-".repeat(1000)),
            format!("{}True", "not ".repeat(1000)),
            vec!["1"; 5000].join(" + "),
            format!("df{}", ".x".repeat(5000)),
        ] {
            match parse_program(&deep) {
                Err(SnippetError::Syntax { message, .. }) => {
                    assert_eq!(message, "expression nested too deeply")
                }
                other => panic!("expected a nesting error, got {:?}", other.map(|p| p.len())),
            }
        }
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["x = ", "def f():", "df[1:2]", "a == b == c", "f(x=1, 2)", "1 +* 2", "x.1"] {
            assert!(
                matches!(parse_program(bad), Err(SnippetError::Syntax { .. })),
                "{} should not parse",
                bad
            );
        }
    }
}
