//! Tokenizer for the expression language

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    And,
    Or,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                // "1.foo" is a member access on 1, only consume the dot before a digit
                if chars[pos] == '.' && !chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit()) {
                    break;
                }
                pos += 1;
            }
            if let Some(end) = exponent_end(&chars, pos) {
                pos = end;
            }
            let text: String = chars[start..pos].iter().collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| EngineError::evaluation(format!("invalid number '{}'", text)))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, pos)?;
            tokens.push(Token::Str(text));
            pos = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" | "undefined" => Token::Null,
                _ => Token::Ident(word),
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let next2 = chars.get(pos + 2).copied();
        let (token, width) = match (c, next, next2) {
            ('=', Some('='), Some('=')) => (Token::StrictEq, 3),
            ('!', Some('='), Some('=')) => (Token::StrictNotEq, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('<', Some('='), _) => (Token::Le, 2),
            ('>', Some('='), _) => (Token::Ge, 2),
            ('&', Some('&'), _) => (Token::And, 2),
            ('|', Some('|'), _) => (Token::Or, 2),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            ('{', _, _) => (Token::LBrace, 1),
            ('}', _, _) => (Token::RBrace, 1),
            (',', _, _) => (Token::Comma, 1),
            ('.', _, _) => (Token::Dot, 1),
            (':', _, _) => (Token::Colon, 1),
            _ => {
                return Err(EngineError::evaluation(format!(
                    "unexpected character '{}' at position {}",
                    c, pos
                )))
            }
        };
        tokens.push(token);
        pos += width;
    }

    Ok(tokens)
}

/// End of an `e[+-]digits` suffix starting at `pos`, if there is one
fn exponent_end(chars: &[char], pos: usize) -> Option<usize> {
    if !matches!(chars.get(pos), Some('e' | 'E')) {
        return None;
    }
    let mut end = pos + 1;
    if matches!(chars.get(end), Some('+' | '-')) {
        end += 1;
    }
    if !chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
        end += 1;
    }
    Some(end)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| EngineError::evaluation("unterminated escape sequence"))?;
                if *escaped == 'u' {
                    let hex: String = chars.iter().skip(pos + 2).take(4).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EngineError::evaluation(format!("invalid escape '\\u{}'", hex)))?;
                    out.push(decoded);
                    pos += 6;
                    continue;
                }
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                pos += 2;
            }
            c if c == quote => return Ok((out, pos + 1)),
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    Err(EngineError::evaluation("unterminated string literal"))
}
