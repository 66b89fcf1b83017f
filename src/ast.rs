use std::fmt;

use crate::token::{SourcePosition, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Bool,
    Integer,
    Float,
}

/// Compact description of a primitive type: kind, signedness, bit width.
/// Equality is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub is_signed: bool,
    pub size: u8,
}

impl TypeInfo {
    pub const VOID: TypeInfo = TypeInfo::new(TypeKind::Void, false, 0);
    pub const BOOL: TypeInfo = TypeInfo::new(TypeKind::Bool, false, 1);
    pub const I32: TypeInfo = TypeInfo::new(TypeKind::Integer, true, 32);
    pub const U32: TypeInfo = TypeInfo::new(TypeKind::Integer, false, 32);
    pub const I64: TypeInfo = TypeInfo::new(TypeKind::Integer, true, 64);
    pub const U64: TypeInfo = TypeInfo::new(TypeKind::Integer, false, 64);
    pub const F32: TypeInfo = TypeInfo::new(TypeKind::Float, true, 32);
    pub const F64: TypeInfo = TypeInfo::new(TypeKind::Float, true, 64);

    const fn new(kind: TypeKind, is_signed: bool, size: u8) -> Self {
        Self {
            kind,
            is_signed,
            size,
        }
    }

    /// The source-language type-name table.
    pub fn from_name(name: &str) -> Option<TypeInfo> {
        match name {
            "bool" => Some(TypeInfo::BOOL),
            "i32" => Some(TypeInfo::I32),
            "u32" => Some(TypeInfo::U32),
            "i64" => Some(TypeInfo::I64),
            "u64" => Some(TypeInfo::U64),
            "f32" => Some(TypeInfo::F32),
            "f64" => Some(TypeInfo::F64),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match (self.kind, self.is_signed, self.size) {
            (TypeKind::Void, ..) => "void",
            (TypeKind::Bool, ..) => "bool",
            (TypeKind::Integer, true, 32) => "i32",
            (TypeKind::Integer, true, _) => "i64",
            (TypeKind::Integer, false, 32) => "u32",
            (TypeKind::Integer, false, _) => "u64",
            (TypeKind::Float, _, 32) => "f32",
            (TypeKind::Float, ..) => "f64",
        }
    }
}

/// Literal payload; the accompanying `TypeInfo` controls interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int32(value) => write!(f, "{value}"),
            Value::UInt32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}"),
            Value::UInt64(value) => write!(f, "{value}"),
            Value::Float32(value) => write!(f, "{value}"),
            Value::Float64(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Operation {
    pub fn symbol(self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
            Operation::Multiply => "*",
            Operation::Divide => "/",
            Operation::Equal => "==",
            Operation::NotEqual => "!=",
            Operation::Less => "<",
            Operation::LessEqual => "<=",
            Operation::Greater => ">",
            Operation::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable {
        name: Token,
    },
    Literal {
        position: SourcePosition,
        type_info: TypeInfo,
        value: Value,
    },
    StringLiteral {
        position: SourcePosition,
        value: String,
    },
    Binop {
        position: SourcePosition,
        operation: Operation,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Condition {
        position: SourcePosition,
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Option<Box<Expression>>,
    },
    Call {
        name: Token,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn position(&self) -> SourcePosition {
        match self {
            Expression::Variable { name } | Expression::Call { name, .. } => name.position,
            Expression::Literal { position, .. }
            | Expression::StringLiteral { position, .. }
            | Expression::Binop { position, .. }
            | Expression::Condition { position, .. } => *position,
        }
    }

    /// Deterministic S-expression rendering of the node.
    pub fn describe(&self) -> String {
        match self {
            Expression::Variable { name } => format!("({})", name.lexeme),
            Expression::Literal {
                type_info, value, ..
            } => format!("({}<{}>)", type_info.name(), value),
            Expression::StringLiteral { value, .. } => format!("(\"{value}\")"),
            Expression::Binop {
                operation,
                left,
                right,
                ..
            } => format!(
                "({} {} {})",
                operation.symbol(),
                left.describe(),
                right.describe()
            ),
            Expression::Condition {
                condition,
                then,
                otherwise,
                ..
            } => match otherwise {
                Some(otherwise) => format!(
                    "(if {} then {} otherwise {})",
                    condition.describe(),
                    then.describe(),
                    otherwise.describe()
                ),
                None => format!("(if {} then {})", condition.describe(), then.describe()),
            },
            Expression::Call { name, arguments } => {
                let mut rendered = format!("(call {}", name.lexeme);
                for argument in arguments {
                    rendered.push(' ');
                    rendered.push_str(&argument.describe());
                }
                rendered.push(')');
                rendered
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Token,
    pub type_info: TypeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPrototype {
    pub name: Token,
    pub parameters: Vec<Parameter>,
    pub return_type_info: TypeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub position: SourcePosition,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression {
        expression: Expression,
    },
    VariableDeclaration {
        name: Token,
        type_info: TypeInfo,
        initializer: Expression,
    },
    Block(Block),
    Return {
        position: SourcePosition,
        value: Expression,
    },
    Function {
        position: SourcePosition,
        prototype: FunctionPrototype,
        body: Block,
    },
}

impl Statement {
    pub fn describe(&self) -> String {
        match self {
            Statement::Expression { expression } => expression.describe(),
            Statement::VariableDeclaration {
                name,
                type_info,
                initializer,
            } => format!(
                "(var {} {} {})",
                name.lexeme,
                type_info.name(),
                initializer.describe()
            ),
            Statement::Block(block) => describe_block(block),
            Statement::Return { value, .. } => format!("(return {})", value.describe()),
            Statement::Function {
                prototype, body, ..
            } => {
                let parameters = prototype
                    .parameters
                    .iter()
                    .map(|parameter| {
                        format!("{}: {}", parameter.name.lexeme, parameter.type_info.name())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "(func {} ({}) -> {} {})",
                    prototype.name.lexeme,
                    parameters,
                    prototype.return_type_info.name(),
                    describe_block(body)
                )
            }
        }
    }
}

fn describe_block(block: &Block) -> String {
    let mut rendered = String::from("(block");
    for statement in &block.statements {
        rendered.push(' ');
        rendered.push_str(&statement.describe());
    }
    rendered.push(')');
    rendered
}

/// An ordered sequence of top-level statements; owns the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn literal(value: i64) -> Expression {
        Expression::Literal {
            position: SourcePosition::default(),
            type_info: TypeInfo::I64,
            value: Value::Int64(value),
        }
    }

    #[test]
    fn type_names_round_trip_through_the_table() {
        for name in ["bool", "i32", "u32", "i64", "u64", "f32", "f64"] {
            let type_info = TypeInfo::from_name(name).expect("known type name");
            assert_eq!(type_info.name(), name);
        }
        assert_eq!(TypeInfo::from_name("quux"), None);
        assert_eq!(TypeInfo::from_name("Void"), None);
    }

    #[test]
    fn type_info_equality_is_structural() {
        assert_eq!(TypeInfo::from_name("i32"), Some(TypeInfo::I32));
        assert_ne!(TypeInfo::I32, TypeInfo::U32);
        assert_ne!(TypeInfo::I32, TypeInfo::I64);
    }

    #[test]
    fn literals_describe_with_their_type_name() {
        assert_eq!(literal(1).describe(), "(i64<1>)");

        let float = Expression::Literal {
            position: SourcePosition::default(),
            type_info: TypeInfo::F32,
            value: Value::Float32(2.5),
        };
        assert_eq!(float.describe(), "(f32<2.5>)");
    }

    #[test]
    fn binops_describe_prefix_style() {
        let inner = Expression::Binop {
            position: SourcePosition::default(),
            operation: Operation::Divide,
            left: Box::new(literal(2)),
            right: Box::new(literal(3)),
        };
        let outer = Expression::Binop {
            position: SourcePosition::default(),
            operation: Operation::Add,
            left: Box::new(literal(1)),
            right: Box::new(inner),
        };
        assert_eq!(outer.describe(), "(+ (i64<1>) (/ (i64<2>) (i64<3>)))");
    }

    #[test]
    fn conditions_describe_with_optional_otherwise() {
        let condition = Expression::Condition {
            position: SourcePosition::default(),
            condition: Box::new(literal(1)),
            then: Box::new(literal(2)),
            otherwise: None,
        };
        assert_eq!(condition.describe(), "(if (i64<1>) then (i64<2>))");

        let condition = Expression::Condition {
            position: SourcePosition::default(),
            condition: Box::new(literal(1)),
            then: Box::new(literal(2)),
            otherwise: Some(Box::new(literal(3))),
        };
        assert_eq!(
            condition.describe(),
            "(if (i64<1>) then (i64<2>) otherwise (i64<3>))"
        );
    }

    #[test]
    fn calls_describe_their_arguments() {
        let call = Expression::Call {
            name: Token::new(TokenKind::Identifier, "add", SourcePosition::default()),
            arguments: vec![literal(1), literal(2)],
        };
        assert_eq!(call.describe(), "(call add (i64<1>) (i64<2>))");
    }
}
