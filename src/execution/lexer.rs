use crate::execution::SnippetError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    /// Operators and punctuation, longest match first.
    Op(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[",
    "]", "{", "}", ",", ":", ".", "&", "|", "~",
];

/// Split snippet text into tokens. Newlines inside brackets and after a
/// trailing backslash are joined; `#` starts a comment.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SnippetError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut depth: usize = 0;
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            if depth == 0 && !matches!(tokens.last(), Some(Spanned { token: Token::Newline, .. }) | None) {
                tokens.push(Spanned { token: Token::Newline, line });
            }
            line += 1;
            i += 1;
            continue;
        }
        if c == '\\' && chars.get(i + 1) == Some(&'\n') {
            line += 1;
            i += 2;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == ';' && depth == 0 {
            tokens.push(Spanned { token: Token::Newline, line });
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) {
            let (token, next) = lex_number(&chars, i, line)?;
            tokens.push(Spanned { token, line });
            i = next;
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next, lines) = lex_string(&chars, i, line)?;
            tokens.push(Spanned { token: Token::Str(text), line });
            line += lines;
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            // f-strings and raw strings: treat the prefix as part of the literal.
            if matches!(word.as_str(), "f" | "r" | "rf" | "fr")
                && i < chars.len()
                && (chars[i] == '"' || chars[i] == '\'')
            {
                if word.contains('f') {
                    return Err(SnippetError::Syntax {
                        line,
                        message: "f-strings are not supported".to_string(),
                    });
                }
                let (text, next, lines) = lex_string(&chars, i, line)?;
                tokens.push(Spanned { token: Token::Str(text), line });
                line += lines;
                i = next;
                continue;
            }
            tokens.push(Spanned { token: Token::Name(word), line });
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = OPERATORS
            .iter()
            .find(|op| rest.starts_with(**op))
            .copied()
            .ok_or_else(|| SnippetError::Syntax {
                line,
                message: format!("unexpected character '{}'", c),
            })?;
        match op {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.checked_sub(1).ok_or_else(|| SnippetError::Syntax {
                    line,
                    message: format!("unmatched '{}'", op),
                })?;
            }
            _ => {}
        }
        tokens.push(Spanned { token: Token::Op(op), line });
        i += op.len();
    }

    if depth > 0 {
        return Err(SnippetError::Syntax {
            line,
            message: "unexpected end of input: unclosed bracket".to_string(),
        });
    }
    if !matches!(tokens.last(), Some(Spanned { token: Token::Newline, .. }) | None) {
        tokens.push(Spanned { token: Token::Newline, line });
    }
    tokens.push(Spanned { token: Token::Eof, line });
    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize, line: usize) -> Result<(Token, usize), SnippetError> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '_' {
            i += 1;
        } else if c == '.' && !is_float && chars.get(i + 1).map_or(true, |n| n.is_ascii_digit() || !n.is_alphabetic()) {
            is_float = true;
            i += 1;
        } else if (c == 'e' || c == 'E')
            && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit() || *n == '-' || *n == '+')
        {
            is_float = true;
            i += 2;
        } else {
            break;
        }
    }
    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let bad = || SnippetError::Syntax {
        line,
        message: format!("invalid number literal '{}'", text),
    };
    let token = if is_float {
        Token::Float(text.parse::<f64>().map_err(|_| bad())?)
    } else {
        Token::Int(text.parse::<i64>().map_err(|_| bad())?)
    };
    Ok((token, i))
}

/// Returns (content, index after closing quote, newlines consumed).
fn lex_string(chars: &[char], start: usize, line: usize) -> Result<(String, usize, usize), SnippetError> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut i = if triple { start + 3 } else { start + 1 };
    let mut out = String::new();
    let mut lines = 0;

    while i < chars.len() {
        let c = chars[i];
        if triple {
            if c == quote && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                return Ok((out, i + 3, lines));
            }
        } else if c == quote {
            return Ok((out, i + 1, lines));
        } else if c == '\n' {
            break;
        }
        if c == '\\' {
            if let Some(next) = chars.get(i + 1) {
                out.push(match next {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
                continue;
            }
        }
        if c == '\n' {
            lines += 1;
        }
        out.push(c);
        i += 1;
    }

    Err(SnippetError::Syntax {
        line,
        message: "unterminated string literal".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_assignment_and_expression_lines() {
        assert_eq!(
            kinds("x = 1\nx"),
            vec![
                Token::Name("x".into()),
                Token::Op("="),
                Token::Int(1),
                Token::Newline,
                Token::Name("x".into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_are_joined() {
        let tokens = kinds("(a\n  + 2.5)  # trailing comment\n");
        assert_eq!(
            tokens,
            vec![
                Token::Op("("),
                Token::Name("a".into()),
                Token::Op("+"),
                Token::Float(2.5),
                Token::Op(")"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_operators() {
        let tokens = kinds(r#"df["Refund Amount"] // 2 != 'a\'b'"#);
        assert!(tokens.contains(&Token::Str("Refund Amount".into())));
        assert!(tokens.contains(&Token::Op("//")));
        assert!(tokens.contains(&Token::Op("!=")));
        assert!(tokens.contains(&Token::Str("a'b".into())));
    }

    #[test]
    fn test_unbalanced_brackets_fail() {
        assert!(matches!(tokenize("sum(df['x']"), Err(SnippetError::Syntax { .. })));
        assert!(matches!(tokenize("x)"), Err(SnippetError::Syntax { .. })));
        assert!(matches!(tokenize("'abc"), Err(SnippetError::Syntax { .. })));
    }
}
