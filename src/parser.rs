use crate::ast::{
    Block, Expression, FunctionPrototype, Operation, Parameter, Program, Statement, TypeInfo,
    Value,
};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Binding power ladder, lowest to highest. Left associativity falls out of
/// parsing right operands at `precedence.next()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Equals,
    Inequality,
    Term,
    Factor,
    Call,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Equals,
            Precedence::Equals => Precedence::Inequality,
            Precedence::Inequality => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor | Precedence::Call => Precedence::Call,
        }
    }
}

type PrefixRule<'a> = fn(&mut Parser<'a>) -> Option<Expression>;
type InfixRule<'a> = fn(&mut Parser<'a>, Expression) -> Option<Expression>;

struct ParseRule<'a> {
    prefix: Option<PrefixRule<'a>>,
    infix: Option<InfixRule<'a>>,
    precedence: Precedence,
}

impl<'a> ParseRule<'a> {
    const fn new(
        prefix: Option<PrefixRule<'a>>,
        infix: Option<InfixRule<'a>>,
        precedence: Precedence,
    ) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

/// Pratt parser over the lexer's token stream.
///
/// Syntax errors are recorded as formatted strings and the offending node
/// collapses to a `None` sentinel; callers must check `errors()` before
/// trusting the returned `Program`.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    errors: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            previous: Token::end(),
            errors: Vec::new(),
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::End {
            if let Some(statement) = self.statement() {
                statements.push(statement);
            }
        }
        Program { statements }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Prefix/infix dispatch table keyed on token kind. `func` and `return`
    /// produce statements, so the statement dispatcher routes them instead
    /// of this table.
    fn rule(kind: TokenKind) -> ParseRule<'a> {
        match kind {
            TokenKind::Number => ParseRule::new(Some(Parser::number), None, Precedence::None),
            TokenKind::String => ParseRule::new(Some(Parser::string), None, Precedence::None),
            TokenKind::Identifier => {
                ParseRule::new(Some(Parser::variable), None, Precedence::None)
            }
            TokenKind::If => ParseRule::new(Some(Parser::conditional), None, Precedence::None),
            TokenKind::LParen => {
                ParseRule::new(Some(Parser::grouping), Some(Parser::call), Precedence::Call)
            }
            TokenKind::Plus | TokenKind::Minus => {
                ParseRule::new(None, Some(Parser::binary), Precedence::Term)
            }
            TokenKind::Star | TokenKind::Slash => {
                ParseRule::new(None, Some(Parser::binary), Precedence::Factor)
            }
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => {
                ParseRule::new(None, Some(Parser::binary), Precedence::Inequality)
            }
            TokenKind::Equal | TokenKind::NotEqual => {
                ParseRule::new(None, Some(Parser::binary), Precedence::Equals)
            }
            _ => ParseRule::new(None, None, Precedence::None),
        }
    }

    fn expression(&mut self, precedence: Precedence) -> Option<Expression> {
        self.advance();

        let Some(prefix) = Self::rule(self.previous.kind).prefix else {
            self.error_at_previous(&format!(
                "Expected a prefix parse rule for token kind: {}",
                self.previous.kind.name()
            ));
            return None;
        };
        let mut left = prefix(self)?;

        while precedence <= Self::rule(self.current.kind).precedence {
            self.advance();
            let Some(infix) = Self::rule(self.previous.kind).infix else {
                return Some(left);
            };
            left = infix(self, left)?;
        }

        Some(left)
    }

    fn statement(&mut self) -> Option<Statement> {
        match self.current.kind {
            TokenKind::Func => self.function(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Var => self.variable_declaration(),
            _ => {
                let expression = self.expression(Precedence::Assignment)?;
                Some(Statement::Expression { expression })
            }
        }
    }

    fn function(&mut self) -> Option<Statement> {
        let position = self.current.position;
        self.advance(); // func

        let name = self.current.clone();
        self.consume(TokenKind::Identifier, "Expected a function name");
        self.consume(TokenKind::LParen, "Expected '('");

        let mut parameters = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::End) {
            if !parameters.is_empty() && self.check(TokenKind::Comma) {
                self.advance();
            }

            let name = self.current.clone();
            self.consume(
                TokenKind::Identifier,
                "Expected a name for a function parameter",
            );
            self.consume(
                TokenKind::Colon,
                "Expected a colon after function parameter name",
            );
            let type_info = self.type_annotation()?;
            parameters.push(Parameter { name, type_info });
        }
        self.consume(TokenKind::RParen, "Expected ')'");

        let return_type_info = if self.check(TokenKind::Arrow) {
            self.advance();
            self.type_annotation()?
        } else {
            TypeInfo::VOID
        };

        let body = self.block()?;

        Some(Statement::Function {
            position,
            prototype: FunctionPrototype {
                name,
                parameters,
                return_type_info,
            },
            body,
        })
    }

    fn block(&mut self) -> Option<Block> {
        let position = self.current.position;
        self.consume(TokenKind::LBrace, "Expected a '{'");

        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
            if let Some(statement) = self.statement() {
                statements.push(statement);
            }
        }
        self.consume(TokenKind::RBrace, "Expected a '}'");

        Some(Block {
            position,
            statements,
        })
    }

    fn return_statement(&mut self) -> Option<Statement> {
        let position = self.current.position;
        self.advance(); // return

        let value = self.expression(Precedence::Assignment)?;
        Some(Statement::Return { position, value })
    }

    fn variable_declaration(&mut self) -> Option<Statement> {
        self.advance(); // var

        let name = self.current.clone();
        self.consume(TokenKind::Identifier, "Expected a variable name");
        self.consume(
            TokenKind::Colon,
            "Expected a colon between variable name and type",
        );
        let type_info = self.type_annotation()?;
        self.consume(TokenKind::Assign, "Expected an initializer");
        let initializer = self.expression(Precedence::Assignment)?;

        Some(Statement::VariableDeclaration {
            name,
            type_info,
            initializer,
        })
    }

    fn type_annotation(&mut self) -> Option<TypeInfo> {
        let token = self.current.clone();
        self.consume(TokenKind::Identifier, "Expected a type name");

        match TypeInfo::from_name(&token.lexeme) {
            Some(type_info) => Some(type_info),
            None => {
                self.error_at(&token, &format!("Unknown type name '{}'", token.lexeme));
                None
            }
        }
    }

    fn number(&mut self) -> Option<Expression> {
        let token = self.previous.clone();
        let lexeme = token.lexeme.as_str();

        let (suffix, body) = match lexeme.len().checked_sub(3).map(|at| lexeme.split_at(at)) {
            Some((body, suffix)) if matches!(suffix, "i32" | "u32" | "u64" | "f32") => {
                (Some(suffix), body)
            }
            _ => (None, lexeme),
        };

        let (type_info, value) = if body.contains('.') {
            if suffix == Some("f32") {
                (TypeInfo::F32, body.parse().ok().map(Value::Float32))
            } else {
                (TypeInfo::F64, body.parse().ok().map(Value::Float64))
            }
        } else {
            match suffix {
                Some("i32") => (TypeInfo::I32, body.parse().ok().map(Value::Int32)),
                Some("u32") => (TypeInfo::U32, body.parse().ok().map(Value::UInt32)),
                Some("u64") => (TypeInfo::U64, body.parse().ok().map(Value::UInt64)),
                _ => (TypeInfo::I64, body.parse().ok().map(Value::Int64)),
            }
        };

        match value {
            Some(value) => Some(Expression::Literal {
                position: token.position,
                type_info,
                value,
            }),
            None => {
                self.error_at(&token, &format!("Invalid numeric literal '{lexeme}'"));
                None
            }
        }
    }

    fn string(&mut self) -> Option<Expression> {
        let token = self.previous.clone();
        let body = &token.lexeme[1..token.lexeme.len() - 1];

        let mut decoded = String::with_capacity(body.len());
        let mut characters = body.chars();
        while let Some(character) = characters.next() {
            if character != '\\' {
                decoded.push(character);
                continue;
            }
            match characters.next() {
                Some('0') => decoded.push('\0'),
                Some('t') => decoded.push('\t'),
                Some('n') => decoded.push('\n'),
                Some('r') => decoded.push('\r'),
                Some(unknown) => {
                    self.error_at(
                        &token,
                        &format!("Unknown character escape sequence in string (\\{unknown})"),
                    );
                    return None;
                }
                None => {
                    self.error_at(&token, "Incomplete character escape sequence in string");
                    return None;
                }
            }
        }

        Some(Expression::StringLiteral {
            position: token.position,
            value: decoded,
        })
    }

    fn variable(&mut self) -> Option<Expression> {
        Some(Expression::Variable {
            name: self.previous.clone(),
        })
    }

    fn grouping(&mut self) -> Option<Expression> {
        let expression = self.expression(Precedence::Assignment)?;
        self.consume(TokenKind::RParen, "Expected ')' after expression");
        Some(expression)
    }

    fn conditional(&mut self) -> Option<Expression> {
        let position = self.previous.position;

        let condition = self.expression(Precedence::Assignment)?;
        self.consume(TokenKind::LBrace, "'{' expected after if condition");
        let then = self.expression(Precedence::Assignment)?;
        self.consume(TokenKind::RBrace, "'}' expected after if body");

        let otherwise = if self.check(TokenKind::Else) {
            self.advance();
            self.consume(TokenKind::LBrace, "'{' expected after else");
            let otherwise = self.expression(Precedence::Assignment)?;
            self.consume(TokenKind::RBrace, "'}' expected after else body");
            Some(Box::new(otherwise))
        } else {
            None
        };

        Some(Expression::Condition {
            position,
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise,
        })
    }

    fn binary(&mut self, left: Expression) -> Option<Expression> {
        let operator = self.previous.clone();
        let operation = match operator.kind {
            TokenKind::Plus => Operation::Add,
            TokenKind::Minus => Operation::Subtract,
            TokenKind::Star => Operation::Multiply,
            TokenKind::Slash => Operation::Divide,
            TokenKind::Less => Operation::Less,
            TokenKind::LessEqual => Operation::LessEqual,
            TokenKind::Greater => Operation::Greater,
            TokenKind::GreaterEqual => Operation::GreaterEqual,
            TokenKind::Equal => Operation::Equal,
            TokenKind::NotEqual => Operation::NotEqual,
            _ => {
                self.error_at(
                    &operator,
                    &format!("Unsupported binary operation: {}", operator.kind.name()),
                );
                return None;
            }
        };

        let precedence = Self::rule(operator.kind).precedence;
        let right = self.expression(precedence.next())?;

        Some(Expression::Binop {
            position: operator.position,
            operation,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn call(&mut self, left: Expression) -> Option<Expression> {
        let Expression::Variable { name } = left else {
            self.error_at_previous("Expected a function name before '('");
            return None;
        };

        let mut arguments = Vec::new();
        if !self.check(TokenKind::RParen) {
            arguments.push(self.expression(Precedence::Assignment)?);
            while !self.check(TokenKind::RParen) && !self.check(TokenKind::End) {
                if self.check(TokenKind::Comma) {
                    self.advance();
                }
                arguments.push(self.expression(Precedence::Assignment)?);
            }
        }
        self.consume(
            TokenKind::RParen,
            "Expected ')' at the end of an argument list",
        );

        Some(Expression::Call { name, arguments })
    }

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }

        let message = format!(
            "Expected {}, but got {}. {}",
            kind.name(),
            self.current.kind.name(),
            message
        );
        let token = self.current.clone();
        self.error_at(&token, &message);
    }

    fn error_at_previous(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        self.errors.push(format!(
            "[line {}] Error at {}: {}",
            token.position.line, token.lexeme, message
        ));
    }
}

/// Lexes and parses `source`, returning the program alongside any recorded
/// syntax errors.
pub fn parse_source(source: &str) -> (Program, Vec<String>) {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    let errors = parser.errors;
    (program, errors)
}
