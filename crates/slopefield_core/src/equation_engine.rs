use thiserror::Error;

/// Deepest expression tree (and parser nesting) accepted by [`parse`].
pub const MAX_EXPRESSION_DEPTH: usize = 256;

/// Errors produced while turning an expression string into bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Equation is empty")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Expected ')'")]
    UnclosedParen,
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Expression is nested too deeply (limit {0})")]
    TooDeep(usize),
}

/// Single-argument functions understood by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "exp" => Function::Exp,
            // `log` is the natural logarithm, as in most calculators' math libraries.
            "log" | "ln" => Function::Ln,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            _ => return None,
        };
        Some(function)
    }

    fn apply(self, a: f64) -> f64 {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Asin => a.asin(),
            Function::Acos => a.acos(),
            Function::Atan => a.atan(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// The only free variables are `x` and `y`, so each has its own load instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant value onto the stack.
    LoadConst(f64),
    /// Pushes the current `x`.
    LoadX,
    /// Pushes the current `y`.
    LoadY,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating slope expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `x`, `y`: The point being evaluated.
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the value left on the stack. Arithmetic follows IEEE-754, so the
/// result may be non-finite; callers decide what that means.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, x: f64, y: f64, stack: &mut Vec<f64>) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(val),
                OpCode::LoadX => stack.push(x),
                OpCode::LoadY => stack.push(y),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
                OpCode::Call(function) => {
                    let a = pop(stack);
                    stack.push(function.apply(a));
                }
            }
        }

        // Compiled bytecode always leaves exactly one value; anything else is a bug upstream.
        stack.pop().unwrap_or(f64::NAN)
    }
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    stack.pop().unwrap_or(f64::NAN)
}

fn pop_pair(stack: &mut Vec<f64>) -> (f64, f64) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // functions like sin(x)
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves `x`, `y` and the named constants; every other identifier is rejected.
pub struct Compiler;

impl Compiler {
    pub fn compile(expr: &Expr) -> Result<Bytecode, CompileError> {
        let mut ops = Vec::new();
        Self::compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => match name.as_str() {
                "x" => ops.push(OpCode::LoadX),
                "y" => ops.push(OpCode::LoadY),
                "pi" => ops.push(OpCode::LoadConst(std::f64::consts::PI)),
                "e" => ops.push(OpCode::LoadConst(std::f64::consts::E)),
                _ => return Err(CompileError::UnknownVariable(name.clone())),
            },
            Expr::Binary(left, op, right) => {
                Self::compile_recursive(left, ops)?;
                Self::compile_recursive(right, ops)?;
                let code = match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => return Err(CompileError::UnexpectedToken(format!("'{op}'"))),
                };
                ops.push(code);
            }
            Expr::Unary(op, operand) => {
                Self::compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => return Err(CompileError::UnexpectedToken(format!("'{op}'"))),
                }
            }
            Expr::Call(func, arg) => {
                let function = Function::from_name(func)
                    .ok_or_else(|| CompileError::UnknownFunction(func.clone()))?;
                Self::compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

/// Parses and compiles an expression in one go.
pub fn compile_expression(input: &str) -> Result<Bytecode, CompileError> {
    let expr = parse(input)?;
    Compiler::compile(&expr)
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
/// The whole input must be consumed; trailing tokens are an error.
/// Trees deeper than [`MAX_EXPRESSION_DEPTH`] are rejected.
pub fn parse(input: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (expr, _) = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(CompileError::UnexpectedToken(token.describe())),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("'{n}'"),
            Token::Identifier(name) => format!("'{name}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            // Scientific notation only when digits follow, so `2e` stays `2` then constant `e`.
            if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                let mut lookahead = pos + 1;
                if lookahead < chars.len() && (chars[lookahead] == '+' || chars[lookahead] == '-')
                {
                    lookahead += 1;
                }
                if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
                    pos = lookahead;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let literal: String = chars[start..pos].iter().collect();
            let value = literal
                .parse()
                .map_err(|_| CompileError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Identifier(chars[start..pos].iter().collect()));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(CompileError::UnexpectedCharacter { ch: c, position: pos }),
            };
            tokens.push(token);
            pos += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

/// A parsed subtree together with its depth.
type Parsed = Result<(Expr, usize), CompileError>;

fn checked_depth(depth: usize) -> Result<usize, CompileError> {
    if depth > MAX_EXPRESSION_DEPTH {
        Err(CompileError::TooDeep(MAX_EXPRESSION_DEPTH))
    } else {
        Ok(depth)
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Parsed {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Parsed {
        let (mut left, mut depth) = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let (right, right_depth) = self.parse_factor()?;
            depth = checked_depth(depth.max(right_depth) + 1)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok((left, depth))
    }

    fn parse_factor(&mut self) -> Parsed {
        let (mut left, mut depth) = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => {
                    self.consume();
                    '*'
                }
                Token::Slash => {
                    self.consume();
                    '/'
                }
                // Implicit multiplication: `2x`, `3(x + 1)`, `x y`.
                Token::Identifier(_) | Token::LParen | Token::Number(_) => '*',
                _ => break,
            };
            let (right, right_depth) = self.parse_unary()?;
            depth = checked_depth(depth.max(right_depth) + 1)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok((left, depth))
    }

    // Every recursive path (parentheses, calls, signs, exponents) re-enters here.
    fn parse_unary(&mut self) -> Parsed {
        self.nesting += 1;
        if self.nesting > MAX_EXPRESSION_DEPTH {
            return Err(CompileError::TooDeep(MAX_EXPRESSION_DEPTH));
        }
        let parsed = self.parse_signed();
        self.nesting -= 1;
        parsed
    }

    fn parse_signed(&mut self) -> Parsed {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let (expr, depth) = self.parse_unary()?;
                Ok((Expr::Unary('-', Box::new(expr)), checked_depth(depth + 1)?))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative and binds tighter than unary minus: -x^2 = -(x^2), 2^3^2 = 2^9.
    fn parse_power(&mut self) -> Parsed {
        let (base, base_depth) = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let (exponent, exponent_depth) = self.parse_unary()?;
            let depth = checked_depth(base_depth.max(exponent_depth) + 1)?;
            return Ok((
                Expr::Binary(Box::new(base), '^', Box::new(exponent)),
                depth,
            ));
        }
        Ok((base, base_depth))
    }

    fn parse_primary(&mut self) -> Parsed {
        match self.consume() {
            Some(Token::Number(n)) => Ok((Expr::Number(n), 1)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let (arg, depth) = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok((Expr::Call(name, Box::new(arg)), checked_depth(depth + 1)?))
                } else {
                    Ok((Expr::Variable(name), 1))
                }
            }
            Some(Token::LParen) => {
                let parsed = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(parsed)
            }
            Some(token) => Err(CompileError::UnexpectedToken(token.describe())),
            None => Err(CompileError::UnexpectedEnd),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), CompileError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(CompileError::UnclosedParen),
        }
    }
}
