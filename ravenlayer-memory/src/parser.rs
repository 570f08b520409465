//! Parser for the query dialect the in-memory backend understands.
//!
//! The accepted grammar covers what [`RawQuery::for_collection`] produces plus a little
//! more:
//!
//! ```text
//! query    := "from" source ["where" or] ["order" "by" sort ("," sort)*] ["limit" n ["," n]]
//! source   := "@all_docs" | collection
//! or       := and ("or" and)*
//! and      := unary ("and" unary)*
//! unary    := "not" unary | primary
//! primary  := "(" or ")" | call | path op operand | path "in" "(" operand ("," operand)* ")"
//! call     := ("search" | "startsWith" | "endsWith") "(" path "," operand ")" | "exists" "(" path ")"
//! ```
//!
//! Keywords are case-insensitive. `$name` operands are bound from the query's parameters
//! while parsing, so the resulting [`Expr`] carries concrete values.
//!
//! [`RawQuery::for_collection`]: ravenlayer_core::query::RawQuery::for_collection

use serde_json::{Number, Value};

use ravenlayer_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Parameters, RawQuery},
};

/// Path of the collection name in a document's metadata.
const COLLECTION_PATH: &str = "@metadata.@collection";

const ALL_DOCS: &str = "@all_docs";

/// Deepest nesting of parentheses and `not` a filter may use.
const MAX_DEPTH: usize = 64;

/// A query broken into the parts the store evaluates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedQuery {
    pub filter: Option<Expr>,
    /// Sort keys as `(path, descending)`.
    pub order_by: Vec<(String, bool)>,
    pub skip: usize,
    pub take: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Number),
    Param(String),
    Symbol(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
}

fn query_error(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::Query(message.into())
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

fn tokenize(input: &str) -> DocumentStoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            },
            '(' | ')' | ',' | '.' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                });
            },
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;

                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        },
                        quote if quote == c => {
                            // A doubled quote is an escaped quote.
                            if chars.peek().is_some_and(|&(_, after)| after == c) {
                                chars.next();
                                text.push(c);
                            } else {
                                closed = true;
                                break;
                            }
                        },
                        other => text.push(other),
                    }
                }

                if !closed {
                    return Err(query_error(format!("unterminated string starting at {start}")));
                }
                tokens.push(Token::Str(text));
            },
            '$' => {
                chars.next();
                let mut name = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }

                if name.is_empty() {
                    return Err(query_error(format!("empty parameter name at {start}")));
                }
                tokens.push(Token::Param(name));
            },
            '=' | '!' | '<' | '>' => {
                chars.next();
                let next = chars.peek().map(|&(_, next)| next);

                let symbol = match (c, next) {
                    ('=', Some('=')) => "==",
                    ('!', Some('=')) => "!=",
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('=', _) => "=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err(query_error(format!("unexpected '{c}' at {start}"))),
                };

                if symbol.len() == 2 {
                    chars.next();
                }
                tokens.push(Token::Symbol(symbol));
            },
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut text = c.to_string();
                while let Some(&(_, next)) = chars.peek() {
                    if !(next.is_ascii_digit() || next == '.') {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }

                let number = if text.contains('.') {
                    text.parse::<f64>().ok().and_then(Number::from_f64)
                } else {
                    text.parse::<i64>().ok().map(Number::from)
                };

                match number {
                    Some(number) => tokens.push(Token::Number(number)),
                    None => return Err(query_error(format!("invalid number '{text}' at {start}"))),
                }
            },
            c if is_ident_char(c) => {
                let mut ident = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    ident.push(next);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            },
            other => return Err(query_error(format!("unexpected '{other}' at {start}"))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    parameters: &'a Parameters,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> DocumentStoreResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(query_error(format!("expected '{keyword}', found {:?}", self.peek())))
        }
    }

    fn expect(&mut self, expected: Token) -> DocumentStoreResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(query_error(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn parse_query(&mut self) -> DocumentStoreResult<ParsedQuery> {
        self.expect_keyword("from")?;

        let source = match self.advance() {
            Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
            other => return Err(query_error(format!("expected a query source, found {other:?}"))),
        };

        let mut filter = if source.eq_ignore_ascii_case(ALL_DOCS) {
            None
        } else {
            Some(Expr::field(COLLECTION_PATH, FieldOp::Eq, source))
        };

        if self.eat_keyword("where") {
            let clause = self.parse_or()?;
            filter = Some(match filter {
                Some(collection) => collection.and(clause),
                None => clause,
            });
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let path = self.parse_path()?;
                let descending = if self.eat_keyword("desc") {
                    true
                } else {
                    self.eat_keyword("asc");
                    false
                };
                order_by.push((path, descending));

                if self.peek() != Some(&Token::Comma) {
                    break;
                }
                self.pos += 1;
            }
        }

        let (mut skip, mut take) = (0, None);
        if self.eat_keyword("limit") {
            let first = self.parse_count()?;
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                skip = first;
                take = Some(self.parse_count()?);
            } else {
                take = Some(first);
            }
        }

        if let Some(token) = self.peek() {
            return Err(query_error(format!("unexpected trailing {token:?}")));
        }

        Ok(ParsedQuery {
            filter,
            order_by,
            skip,
            take,
        })
    }

    fn parse_count(&mut self) -> DocumentStoreResult<usize> {
        match self.advance() {
            Some(Token::Number(number)) => number
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| query_error(format!("invalid count {number}"))),
            Some(Token::Param(name)) => self
                .parameter(&name)?
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| query_error(format!("parameter ${name} is not a count"))),
            other => Err(query_error(format!("expected a count, found {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> DocumentStoreResult<Expr> {
        let mut exprs = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            exprs.push(self.parse_and()?);
        }

        Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::Or(exprs) })
    }

    fn parse_and(&mut self) -> DocumentStoreResult<Expr> {
        let mut exprs = vec![self.parse_unary()?];
        while self.eat_keyword("and") {
            exprs.push(self.parse_unary()?);
        }

        Ok(if exprs.len() == 1 { exprs.remove(0) } else { Expr::And(exprs) })
    }

    /// Runs `parse` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> DocumentStoreResult<T>) -> DocumentStoreResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(query_error(format!("filter nested deeper than {MAX_DEPTH} levels")));
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_unary(&mut self) -> DocumentStoreResult<Expr> {
        if self.eat_keyword("not") {
            return self.nested(|parser| Ok(parser.parse_unary()?.not()));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> DocumentStoreResult<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let expr = self.nested(Self::parse_or)?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }

        if let (Some(Token::Ident(name)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            let name = name.to_ascii_lowercase();
            self.pos += 2;
            return self.parse_call(&name);
        }

        let field = self.parse_path()?;

        if self.eat_keyword("in") {
            self.expect(Token::LParen)?;
            let mut values = vec![self.parse_operand()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.parse_operand()?);
            }
            self.expect(Token::RParen)?;

            return Ok(Expr::field(field, FieldOp::AnyOf, Value::Array(values)));
        }

        let op = match self.advance() {
            Some(Token::Symbol("=" | "==")) => FieldOp::Eq,
            Some(Token::Symbol("!=" | "<>")) => FieldOp::Ne,
            Some(Token::Symbol("<")) => FieldOp::Lt,
            Some(Token::Symbol("<=")) => FieldOp::Lte,
            Some(Token::Symbol(">")) => FieldOp::Gt,
            Some(Token::Symbol(">=")) => FieldOp::Gte,
            other => return Err(query_error(format!("expected an operator after '{field}', found {other:?}"))),
        };

        Ok(Expr::field(field, op, self.parse_operand()?))
    }

    fn parse_call(&mut self, name: &str) -> DocumentStoreResult<Expr> {
        let field = self.parse_path()?;

        let op = match name {
            "exists" => {
                self.expect(Token::RParen)?;
                return Ok(Expr::Exists(field, true));
            },
            "search" => FieldOp::Search,
            "startswith" => FieldOp::StartsWith,
            "endswith" => FieldOp::EndsWith,
            other => return Err(query_error(format!("unsupported function '{other}'"))),
        };

        self.expect(Token::Comma)?;
        let value = self.parse_operand()?;
        self.expect(Token::RParen)?;

        Ok(Expr::field(field, op, value))
    }

    /// A dot-separated field path. Segments may be quoted, as in `@metadata.'@collection'`.
    fn parse_path(&mut self) -> DocumentStoreResult<String> {
        let mut path = match self.advance() {
            Some(Token::Ident(segment)) | Some(Token::Str(segment)) => segment,
            other => return Err(query_error(format!("expected a field, found {other:?}"))),
        };

        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.advance() {
                Some(Token::Ident(segment)) | Some(Token::Str(segment)) => {
                    path.push('.');
                    path.push_str(&segment);
                },
                other => return Err(query_error(format!("expected a field segment, found {other:?}"))),
            }
        }

        Ok(path)
    }

    fn parse_operand(&mut self) -> DocumentStoreResult<Value> {
        match self.advance() {
            Some(Token::Param(name)) => self.parameter(&name).cloned(),
            Some(Token::Str(text)) => Ok(Value::String(text)),
            Some(Token::Number(number)) => Ok(Value::Number(number)),
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case("null") => Ok(Value::Null),
            other => Err(query_error(format!("expected a value, found {other:?}"))),
        }
    }

    fn parameter(&self, name: &str) -> DocumentStoreResult<&Value> {
        self.parameters
            .get(name)
            .ok_or_else(|| query_error(format!("missing value for parameter ${name}")))
    }
}

/// Parses `query`, binding its parameters.
pub(crate) fn parse(query: &RawQuery) -> DocumentStoreResult<ParsedQuery> {
    Parser {
        tokens: tokenize(&query.text)?,
        pos: 0,
        depth: 0,
        parameters: &query.parameters,
    }
    .parse_query()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ravenlayer_core::query::QueryOptions;
    use rstest::rstest;
    use serde_json::json;

    fn collection(name: &str) -> Expr {
        Expr::field(COLLECTION_PATH, FieldOp::Eq, name)
    }

    #[test]
    fn parses_generated_collection_queries() {
        let options = QueryOptions::builder()
            .skip(10)
            .take(5)
            .order_by_desc("age")
            .build()
            .with_range("age", 18, 65);

        let parsed = parse(&RawQuery::for_collection("Users", &options)).unwrap();

        assert_eq!(
            parsed,
            ParsedQuery {
                filter: Some(Expr::And(vec![
                    collection("Users"),
                    Expr::And(vec![
                        Expr::field("age", FieldOp::Gte, 18),
                        Expr::field("age", FieldOp::Lte, 65),
                    ]),
                ])),
                order_by: vec![("age".into(), true)],
                skip: 10,
                take: Some(5),
            }
        );
    }

    #[test]
    fn parses_generated_search_queries() {
        let options = QueryOptions::new().with_search("john", &["name", "email"]);

        let parsed = parse(&RawQuery::for_collection("Users", &options)).unwrap();

        assert_eq!(
            parsed.filter,
            Some(collection("Users").and(Expr::Or(vec![
                Expr::field("name", FieldOp::Search, "john"),
                Expr::field("email", FieldOp::Search, "john"),
            ])))
        );
    }

    #[rstest]
    #[case("from Users", Some(collection("Users")))]
    #[case("FROM @all_docs WHERE exists(address.city)", Some(Expr::Exists("address.city".into(), true)))]
    #[case(
        "from @all_docs where not active = true or name <> 'a''b'",
        Some(Expr::Or(vec![
            Expr::field("active", FieldOp::Eq, true).not(),
            Expr::field("name", FieldOp::Ne, "a'b"),
        ]))
    )]
    #[case(
        "from @all_docs where tags in ('x', 2) and startsWith(name, \"Jo\")",
        Some(Expr::And(vec![
            Expr::field("tags", FieldOp::AnyOf, json!(["x", 2])),
            Expr::field("name", FieldOp::StartsWith, "Jo"),
        ]))
    )]
    #[case("from @all_docs where score > -1.5", Some(Expr::field("score", FieldOp::Gt, -1.5)))]
    fn parses_filters(#[case] text: &str, #[case] expected: Option<Expr>) {
        assert_eq!(parse(&RawQuery::new(text)).unwrap().filter, expected);
    }

    #[rstest]
    #[case("from @all_docs where name = $missing")]
    #[case("from @all_docs where name ~ 'x'")]
    #[case("from @all_docs where (name = 'x'")]
    #[case("from @all_docs where name = 'x")]
    #[case("select * from Users")]
    #[case("from @all_docs limit 5 extra")]
    fn rejects_malformed_queries(#[case] text: &str) {
        let err = parse(&RawQuery::new(text)).unwrap_err();

        assert!(matches!(err, DocumentStoreError::Query(_)), "{err}");
    }

    #[test]
    fn deeply_nested_filters_are_rejected() {
        let nested = |depth: usize| {
            format!("from @all_docs where {}a = 1{}", "(".repeat(depth), ")".repeat(depth))
        };

        assert!(parse(&RawQuery::new(nested(MAX_DEPTH))).is_ok());

        let err = parse(&RawQuery::new(nested(100_000))).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Query(_)), "{err}");

        let negations = format!("from @all_docs where {}a = 1", "not ".repeat(100_000));
        assert!(matches!(
            parse(&RawQuery::new(negations)).unwrap_err(),
            DocumentStoreError::Query(_)
        ));
    }

    #[test]
    fn single_limit_is_a_page_size() {
        let parsed = parse(&RawQuery::new("from @all_docs order by name, age asc limit 3")).unwrap();

        assert_eq!(parsed.order_by, vec![("name".into(), false), ("age".into(), false)]);
        assert_eq!((parsed.skip, parsed.take), (0, Some(3)));
    }
}
