use super::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Double(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Bang,
    Minus,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub pos: usize,
}

fn syntax(pos: usize, msg: impl Into<String>) -> ExprError {
    ExprError::Syntax {
        pos,
        msg: msg.into(),
    }
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied();

        let tok = match c {
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b'[' => Tok::LBracket,
            b']' => Tok::RBracket,
            b'.' => Tok::Dot,
            b',' => Tok::Comma,
            b'-' => Tok::Minus,
            b'!' if next == Some(b'=') => {
                i += 1;
                Tok::NotEq
            }
            b'!' => Tok::Bang,
            b'=' if next == Some(b'=') => {
                i += 1;
                Tok::EqEq
            }
            b'<' if next == Some(b'=') => {
                i += 1;
                Tok::Le
            }
            b'<' => Tok::Lt,
            b'>' if next == Some(b'=') => {
                i += 1;
                Tok::Ge
            }
            b'>' => Tok::Gt,
            b'&' if next == Some(b'&') => {
                i += 1;
                Tok::AndAnd
            }
            b'|' if next == Some(b'|') => {
                i += 1;
                Tok::OrOr
            }
            b'\'' | b'"' => {
                let (s, end) = lex_string(src, i)?;
                out.push(Token {
                    tok: Tok::Str(s),
                    pos: start,
                });
                i = end;
                continue;
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let lit = &src[start..i];
                let tok = if lit.contains('.') {
                    lit.parse()
                        .map(Tok::Double)
                        .map_err(|_| syntax(start, format!("bad number {lit:?}")))?
                } else {
                    lit.parse()
                        .map(Tok::Int)
                        .map_err(|_| syntax(start, format!("integer out of range {lit:?}")))?
                };
                out.push(Token { tok, pos: start });
                continue;
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                out.push(Token {
                    tok: Tok::Ident(src[start..i].to_string()),
                    pos: start,
                });
                continue;
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(syntax(i, format!("unexpected character {ch:?}")));
            }
        };

        out.push(Token { tok, pos: start });
        i += 1;
    }

    Ok(out)
}

/// Lex a quoted string starting at `start`; returns the unescaped text and the
/// offset just past the closing quote.
fn lex_string(src: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut chars = src[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(syntax(start, "expected string"));
    };
    let mut out = String::new();

    while let Some((off, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((out, start + off + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, c @ ('\\' | '\'' | '"'))) => out.push(c),
                // Unknown escapes are kept verbatim so regex literals stay readable.
                Some((_, c)) => {
                    out.push('\\');
                    out.push(c);
                }
                None => break,
            },
            c => out.push(c),
        }
    }

    Err(syntax(start, "unterminated string literal"))
}
