//! Tokenizer for the expression language.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semi,
    Newline,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
    Arrow,
    Eof,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split `source` into tokens.
///
/// With `keep_newlines`, a line break outside any bracket pair becomes a
/// statement separator; otherwise all line breaks are whitespace.
pub(crate) fn tokenize(source: &str, keep_newlines: bool) -> Result<Vec<Spanned>, ExprError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let peek = chars.get(i + 1).map(|&(_, c)| c);

        let (token, width) = match c {
            '\n' => {
                i += 1;
                if keep_newlines && depth == 0 {
                    tokens.push(Spanned { token: Token::Newline, offset });
                }
                continue;
            }
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '#' => {
                // Comment to end of line; the newline itself is still a separator.
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
                continue;
            }
            '(' | '[' | '{' => {
                depth += 1;
                let token = match c {
                    '(' => Token::LParen,
                    '[' => Token::LBracket,
                    _ => Token::LBrace,
                };
                (token, 1)
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                let token = match c {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                };
                (token, 1)
            }
            ',' => (Token::Comma, 1),
            '.' => (Token::Dot, 1),
            ':' => (Token::Colon, 1),
            ';' => (Token::Semi, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '=' => match peek {
                Some('=') => (Token::Eq, 2),
                Some('>') => (Token::Arrow, 2),
                _ => (Token::Assign, 1),
            },
            '!' => match peek {
                Some('=') => (Token::Ne, 2),
                _ => (Token::Bang, 1),
            },
            '<' => match peek {
                Some('=') => (Token::Le, 2),
                _ => (Token::Lt, 1),
            },
            '>' => match peek {
                Some('=') => (Token::Ge, 2),
                _ => (Token::Gt, 1),
            },
            '&' if peek == Some('&') => (Token::AndAnd, 2),
            '|' if peek == Some('|') => (Token::OrOr, 2),
            '"' | '\'' => {
                let (value, consumed) = read_string(&chars, i)?;
                i += consumed;
                tokens.push(Spanned { token: Token::Str(value), offset });
                continue;
            }
            c if c.is_ascii_digit() => {
                let (token, consumed) = read_number(&chars, i)?;
                i += consumed;
                tokens.push(Spanned { token, offset });
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                tokens.push(Spanned { token: Token::Ident(ident), offset });
                continue;
            }
            other => {
                return Err(ExprError::Syntax {
                    offset,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };

        tokens.push(Spanned { token, offset });
        i += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

fn read_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ExprError> {
    let (offset, quote) = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((value, i + 1 - start));
        }
        if c == '\\' {
            let escaped = chars.get(i + 1).map(|&(_, c)| c).ok_or(ExprError::Syntax {
                offset,
                message: "unterminated string literal".into(),
            })?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            i += 2;
            continue;
        }
        value.push(c);
        i += 1;
    }

    Err(ExprError::Syntax {
        offset,
        message: "unterminated string literal".into(),
    })
}

fn read_number(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), ExprError> {
    let offset = chars[start].0;
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].1.is_ascii_digit() {
        i += 1;
    }
    // A dot only belongs to the number when a digit follows it.
    if i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].1.is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
        let mut j = i + 1;
        if j < chars.len() && matches!(chars[j].1, '+' | '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].1.is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
    let token = if is_float {
        text.parse::<f64>().map(Token::Float).map_err(|e| ExprError::Syntax {
            offset,
            message: format!("invalid number '{text}': {e}"),
        })?
    } else {
        text.parse::<i64>().map(Token::Int).map_err(|_| ExprError::Syntax {
            offset,
            message: format!("integer literal '{text}' is out of range"),
        })?
    };
    Ok((token, i - start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src, true).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            kinds("a.b >= 1.5 && !c"),
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::Ge,
                Token::Float(1.5),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_whitespace() {
        assert_eq!(
            kinds("x = [1,\n2]\ny"),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::LBracket,
                Token::Int(1),
                Token::Comma,
                Token::Int(2),
                Token::RBracket,
                Token::Newline,
                Token::Ident("y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#"'it\'s\n'"#), vec![Token::Str("it's\n".into()), Token::Eof]);
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(matches!(tokenize("a $ b", false), Err(ExprError::Syntax { offset: 2, .. })));
    }
}
