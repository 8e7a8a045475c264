/* Regex front end: desugar the + and ? operators, split the expression into
 * tokens with explicit concatenation, resolve operator precedence with the
 * shunting-yard algorithm and fold the postfix form into a syntax tree. */

use std::fmt;
use std::rc::Rc;

use crate::fa::EPSILON;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Literal(char),
    Escaped(char),
    Epsilon,
    Union,
    Concat,
    Star,
    Plus,
    Question,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(ch) => write!(f, "{}", ch),
            Token::Escaped(ch) => write!(f, "\\{}", ch),
            Token::Epsilon => write!(f, "{}", EPSILON),
            Token::Union => write!(f, "|"),
            Token::Concat => write!(f, "."),
            Token::Star => write!(f, "*"),
            Token::Plus => write!(f, "+"),
            Token::Question => write!(f, "?"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug)]
pub enum RegexError {
    MalformedExpression(String),
    StackUnderflow(String),
    UnsupportedOperator(String),
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegexError::MalformedExpression(expr) => {
                write!(f, "Error: Malformed expression: {}", expr)
            }
            RegexError::StackUnderflow(op) => write!(
                f,
                "Error: Operator {} found with too few preceding operands!",
                op
            ),
            RegexError::UnsupportedOperator(op) => {
                write!(f, "Error: Unsupported operator {} found!", op)
            }
        }
    }
}

impl std::error::Error for RegexError {}

/// A regular expression syntax tree. Children are reference counted so a
/// subtree can be referenced twice without duplication, which the Thompson
/// compiler relies on when rewriting `A+` as `A.(A*)`.
#[derive(Debug)]
pub enum SyntaxTree {
    Leaf(Token),
    Unary(Token, Rc<SyntaxTree>),
    Binary(Token, Rc<SyntaxTree>, Rc<SyntaxTree>),
}

fn balanced_parenthesis(expr: &str) -> bool {
    let mut depth: usize = 0;
    let mut chars = expr.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    depth == 0
}

// A backslash is live only when it is not itself escaped, i.e. when the run
// of backslashes immediately before the position has even length.
fn is_escaped(chars: &[char], pos: usize) -> bool {
    let mut count = 0;
    let mut k = pos;
    while k > 0 && chars[k - 1] == '\\' {
        count += 1;
        k -= 1;
    }
    count % 2 == 1
}

fn expand_plus_question(chars: &[char]) -> String {
    let mut out = String::new();
    let n = chars.len();
    let mut i = 0;

    while i < n {
        let unit: String = if chars[i] == '\\' && i + 1 < n {
            let token = chars[i..i + 2].iter().collect();
            i += 2;
            token
        } else if chars[i] == '(' && !is_escaped(chars, i) {
            let start = i;
            let mut depth = 1;
            i += 1;
            while i < n && depth > 0 {
                if chars[i] == '(' && !is_escaped(chars, i) {
                    depth += 1;
                } else if chars[i] == ')' && !is_escaped(chars, i) {
                    depth -= 1;
                }
                i += 1;
            }
            let inner = expand_plus_question(&chars[start + 1..i - 1]);
            format!("({})", inner)
        } else {
            let token = chars[i].to_string();
            i += 1;
            token
        };

        if i < n && !is_escaped(chars, i) && (chars[i] == '+' || chars[i] == '?') {
            let op = chars[i];
            i += 1;
            if op == '+' {
                // x+ becomes xx*
                out.push_str(&unit);
                out.push_str(&unit);
                out.push('*');
            } else {
                // x? becomes (x|ε)
                out.push('(');
                out.push_str(&unit);
                out.push('|');
                out.push(EPSILON);
                out.push(')');
            }
        } else {
            out.push_str(&unit);
        }
    }
    out
}

/// Rewrite every `+` and `?` in terms of `*` and `|`, recursively inside
/// parenthesized groups. The unit preceding the operator is an escape pair, a
/// fully bracketed group or a single literal. Unbalanced parentheses are
/// rejected up front rather than producing truncated output.
pub fn desugar(expr: &str) -> Result<String, RegexError> {
    if !balanced_parenthesis(expr) {
        return Err(RegexError::MalformedExpression(expr.to_string()));
    }
    let chars: Vec<char> = expr.chars().collect();
    Ok(expand_plus_question(&chars))
}

/// Split an expression into tokens, treating escape pairs as single tokens,
/// and insert an explicit concatenation operator between adjacent tokens that
/// would otherwise imply concatenation.
pub fn tokenize(expr: &str) -> Vec<Token> {
    let chars: Vec<char> = expr.chars().collect();
    let mut raw = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            raw.push(Token::Escaped(chars[i + 1]));
            i += 2;
        } else {
            raw.push(match chars[i] {
                '|' => Token::Union,
                '.' => Token::Concat,
                '*' => Token::Star,
                '+' => Token::Plus,
                '?' => Token::Question,
                '(' => Token::LParen,
                ')' => Token::RParen,
                EPSILON => Token::Epsilon,
                ch => Token::Literal(ch),
            });
            i += 1;
        }
    }

    let mut tokens = Vec::new();
    for (j, token) in raw.iter().enumerate() {
        if j > 0 {
            let prev = &raw[j - 1];
            let prev_blocks = matches!(prev, Token::Union | Token::LParen);
            let next_blocks = matches!(
                token,
                Token::Union | Token::RParen | Token::Star | Token::Plus | Token::Question
            );
            if !prev_blocks && !next_blocks {
                tokens.push(Token::Concat);
            }
        }
        tokens.push(token.clone());
    }
    tokens
}

fn precedence(token: &Token) -> u8 {
    match token {
        Token::Star | Token::Plus | Token::Question => 3,
        Token::Concat => 2,
        Token::Union => 1,
        _ => 0,
    }
}

fn is_operand(token: &Token) -> bool {
    match token {
        Token::Escaped(_) | Token::Epsilon => true,
        Token::Literal(ch) => ch.is_alphanumeric() || matches!(ch, '_' | '[' | ']' | '{' | '}'),
        _ => false,
    }
}

fn is_operator(token: &Token) -> bool {
    matches!(
        token,
        Token::Union | Token::Concat | Token::Star | Token::Plus | Token::Question
    )
}

/// Convert a token sequence from infix to postfix order with the classic
/// operator-precedence stack algorithm. Operators are left-associative, so an
/// incoming operator pops every stacked operator of equal or higher
/// precedence. An unmatched `)` is dropped and unrecognized tokens are
/// skipped; `desugar` has already rejected unbalanced input, this keeps the
/// transform total for programmatic token sequences.
pub fn to_postfix(tokens: &[Token]) -> Vec<Token> {
    let mut output: Vec<Token> = Vec::new();
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        if is_operand(token) {
            output.push(token.clone());
        } else if *token == Token::LParen {
            stack.push(Token::LParen);
        } else if *token == Token::RParen {
            while stack.last().is_some_and(|top| *top != Token::LParen) {
                output.push(stack.pop().unwrap());
            }
            if stack.last() == Some(&Token::LParen) {
                stack.pop();
            }
        } else if is_operator(token) {
            while stack
                .last()
                .is_some_and(|top| *top != Token::LParen && precedence(top) >= precedence(token))
            {
                output.push(stack.pop().unwrap());
            }
            stack.push(token.clone());
        }
    }

    while let Some(op) = stack.pop() {
        output.push(op);
    }
    output
}

/// Fold a postfix token sequence into a syntax tree with an operand stack.
/// Unary operators wrap one operand, binary operators pop the right child
/// first, every other token becomes a leaf.
pub fn build_tree(postfix: &[Token]) -> Result<Rc<SyntaxTree>, RegexError> {
    let mut stack: Vec<Rc<SyntaxTree>> = Vec::new();

    for token in postfix {
        match token {
            Token::Star | Token::Plus | Token::Question => {
                let child = stack
                    .pop()
                    .ok_or_else(|| RegexError::StackUnderflow(token.to_string()))?;
                stack.push(Rc::new(SyntaxTree::Unary(token.clone(), child)));
            }
            Token::Concat | Token::Union => {
                let right = stack
                    .pop()
                    .ok_or_else(|| RegexError::StackUnderflow(token.to_string()))?;
                let left = stack
                    .pop()
                    .ok_or_else(|| RegexError::StackUnderflow(token.to_string()))?;
                stack.push(Rc::new(SyntaxTree::Binary(token.clone(), left, right)));
            }
            _ => stack.push(Rc::new(SyntaxTree::Leaf(token.clone()))),
        }
    }

    let postfix_string = postfix_string(postfix);
    let root = stack
        .pop()
        .ok_or(RegexError::MalformedExpression(postfix_string.clone()))?;
    if !stack.is_empty() {
        return Err(RegexError::MalformedExpression(postfix_string));
    }
    Ok(root)
}

/// Render a token sequence back into its concatenated string form.
pub fn postfix_string(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.to_string()).collect()
}
