//! Minimal WQL select parser for the in-memory provider
//!
//! Understands `select <*|prop, ...> from <Class> [where <cond> [and <cond>]...]`
//! where a condition is `<prop> = <literal>` or `<prop> like '<pattern>'`.
//! Keywords are case-insensitive.

/// Parsed select statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Select {
    /// Projected properties, `None` for `*`
    pub columns: Option<Vec<String>>,
    /// Target class
    pub class: String,
    /// Conjunction of conditions
    pub conditions: Vec<Condition>,
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Like,
}

/// Single `where` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Condition {
    pub property: String,
    pub op: Op,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Literal(String),
    Star,
    Comma,
    Equals,
}

fn tokenize(wql: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = wql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == quote => {
                            // doubled quote is an escaped quote
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                literal.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(other) => literal.push(other),
                        None => return None,
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if w.is_alphanumeric() || w == '_' || w == '.' || w == '-' {
                        word.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            _ => return None,
        }
    }

    Some(tokens)
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    matches!(token, Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
}

/// Parse a select statement, `None` when the text is not valid WQL
pub(crate) fn parse(wql: &str) -> Option<Select> {
    let tokens = tokenize(wql)?;
    let mut iter = tokens.iter().peekable();

    if !is_keyword(iter.next(), "select") {
        return None;
    }

    let columns = if iter.peek() == Some(&&Token::Star) {
        iter.next();
        None
    } else {
        let mut columns = Vec::new();
        loop {
            match iter.next() {
                Some(Token::Word(w)) if !w.eq_ignore_ascii_case("from") => {
                    columns.push(w.clone());
                }
                _ => return None,
            }
            if iter.peek() == Some(&&Token::Comma) {
                iter.next();
            } else {
                break;
            }
        }
        Some(columns)
    };

    if !is_keyword(iter.next(), "from") {
        return None;
    }

    let class = match iter.next() {
        Some(Token::Word(w)) => w.clone(),
        _ => return None,
    };

    let mut conditions = Vec::new();
    match iter.next() {
        None => {}
        Some(t) if is_keyword(Some(t), "where") => loop {
            let property = match iter.next() {
                Some(Token::Word(w)) => w.clone(),
                _ => return None,
            };
            let op = match iter.next() {
                Some(Token::Equals) => Op::Eq,
                t if is_keyword(t, "like") => Op::Like,
                _ => return None,
            };
            let value = match (op, iter.next()) {
                (_, Some(Token::Literal(v))) => v.clone(),
                (Op::Eq, Some(Token::Word(v))) => v.clone(),
                _ => return None,
            };
            conditions.push(Condition {
                property,
                op,
                value,
            });

            match iter.next() {
                None => break,
                t if is_keyword(t, "and") => {}
                _ => return None,
            }
        },
        Some(_) => return None,
    }

    Some(Select {
        columns,
        class,
        conditions,
    })
}

/// Case-insensitive `like` match with `%` and `_` wildcards
pub(crate) fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                p += 1;
                t += 1;
            }
            Some(&c) if c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}
