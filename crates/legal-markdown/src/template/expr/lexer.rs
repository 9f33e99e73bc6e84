use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Variable path or helper name, kept raw (`client.name`, `items[0]`,
    /// `@index`, `.`).
    Path(String),
    Str(String),
    Number(f64),
    True,
    False,
    Null,
    Question,
    Colon,
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
}

fn is_path_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '@' || c == '$'
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$' || c == '@'
}

/// Splits an expression into tokens. Quoted strings may use either quote
/// style and support backslash escapes, so operators inside quotes never
/// split the expression.
///
/// A `-` between two path characters with no surrounding whitespace is part
/// of the name (`payment-terms`); spaced `a - b` is subtraction.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        ch if ch == quote => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        ch => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err(ExprError::UnterminatedString);
                }
                tokens.push(Token::Str(value));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            '.' if i + 1 < chars.len() && chars[i + 1] == '.' && chars.get(i + 2) == Some(&'/') => {
                // `../name` parent reference
                let start = i;
                i += 3;
                while i < chars.len() && is_path_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Path(chars[start..i].iter().collect()));
            }
            '.' => {
                tokens.push(Token::Path(".".to_string()));
                i += 1;
            }
            c if is_path_start(c) => {
                let start = i;
                i += 1;
                loop {
                    if i >= chars.len() {
                        break;
                    }
                    let ch = chars[i];
                    if is_path_char(ch) {
                        i += 1;
                    } else if ch == '-'
                        && i + 1 < chars.len()
                        && (chars[i + 1].is_alphanumeric() || chars[i + 1] == '_')
                    {
                        i += 1;
                    } else if ch == '[' {
                        let close = chars[i..]
                            .iter()
                            .position(|c| *c == ']')
                            .ok_or(ExprError::UnexpectedEnd)?;
                        i += close + 1;
                    } else {
                        break;
                    }
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    _ => Token::Path(word),
                });
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
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
            '=' | '!' | '>' | '<' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => {
                        // `===` is accepted as `==`
                        if chars.get(i + 2) == Some(&'=') {
                            (Token::Eq, 3)
                        } else {
                            (Token::Eq, 2)
                        }
                    }
                    ('!', Some('=')) => {
                        if chars.get(i + 2) == Some(&'=') {
                            (Token::NotEq, 3)
                        } else {
                            (Token::NotEq, 2)
                        }
                    }
                    ('!', _) => (Token::Not, 1),
                    ('>', Some('=')) => (Token::GtEq, 2),
                    ('>', _) => (Token::Gt, 1),
                    ('<', Some('=')) => (Token::LtEq, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('&', Some('&')) => (Token::And, 2),
                    ('|', Some('|')) => (Token::Or, 2),
                    _ => return Err(ExprError::UnexpectedChar(c)),
                };
                tokens.push(token);
                i += width;
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}
