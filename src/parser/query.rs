//! Query production: `<table.subtype-class?/re/(2-4)$::=carrier>`.
//!
//! Unrecognized tokens inside a query are reported and skipped; parsing
//! resumes at the next clause.

use crate::query::{Carrier, CarrierKind, ClassFilterRule, Query, RegexFilter, SyllableRange};
use crate::rst::{Rst, RstKind};
use crate::token::{Span, Token, TokenKind};

use super::{Compiler, ParseResult, Step, SyntaxError, SyntaxErrorKind, SyntaxParser};

pub(crate) struct QueryParser {
    open_span: Span,
}

impl QueryParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self { open_span }
    }

    /// Split a trailing `.subtype` off a name token. Reports when the name
    /// carries more than one dot.
    fn split_subtype(&self, c: &mut Compiler<'_>, token: &Token) -> (String, Option<String>) {
        let text = token.text.trim();
        match text.split_once('.') {
            None => (text.to_string(), None),
            Some((name, rest)) => {
                if rest.contains('.') {
                    c.report(
                        SyntaxError::new(SyntaxErrorKind::MultipleSubtypes, token.span)
                            .into_diagnostic(),
                    );
                }
                let subtype = rest.split('.').next().unwrap_or("").to_string();
                (name.to_string(), (!subtype.is_empty()).then_some(subtype))
            }
        }
    }

    fn apply_subtype(
        &self,
        c: &mut Compiler<'_>,
        query: &mut Query,
        subtype: Option<String>,
        span: Span,
    ) {
        let Some(subtype) = subtype else {
            return;
        };
        if query.exclusive {
            c.report(
                SyntaxError::new(SyntaxErrorKind::SubtypeAfterExclusive, span).into_diagnostic(),
            );
            return;
        }
        if query.subtype.is_some() {
            c.report(SyntaxError::new(SyntaxErrorKind::MultipleSubtypes, span).into_diagnostic());
            return;
        }
        query.subtype = Some(subtype);
    }

    /// `(n)`, `(n-)`, `(-n)`, or `(n-m)`. The opening paren is consumed.
    fn parse_range(&self, c: &mut Compiler<'_>) -> ParseResult<SyllableRange> {
        let parse_int = |token: &Token| -> ParseResult<u32> {
            token.text.parse().map_err(|_| {
                SyntaxError::new(
                    SyntaxErrorKind::InvalidNumber {
                        text: token.text.clone(),
                    },
                    token.span,
                )
            })
        };

        let first = c.reader.read_loose();
        match first.kind {
            TokenKind::Digits => {
                let min = parse_int(&first)?;
                let next = c.reader.read_loose();
                match next.kind {
                    TokenKind::RightParen => Ok(SyllableRange {
                        min: Some(min),
                        max: Some(min),
                    }),
                    TokenKind::Hyphen => {
                        let after = c.reader.read_loose();
                        match after.kind {
                            TokenKind::RightParen => Ok(SyllableRange {
                                min: Some(min),
                                max: None,
                            }),
                            TokenKind::Digits => {
                                let max = parse_int(&after)?;
                                c.reader.expect_loose(TokenKind::RightParen, "syllable range")?;
                                Ok(SyllableRange {
                                    min: Some(min),
                                    max: Some(max),
                                })
                            }
                            found => Err(SyntaxError::new(
                                SyntaxErrorKind::Expected {
                                    expected: TokenKind::Digits,
                                    found,
                                    label: "syllable range".to_string(),
                                },
                                after.span,
                            )),
                        }
                    }
                    found => Err(SyntaxError::new(
                        SyntaxErrorKind::Expected {
                            expected: TokenKind::RightParen,
                            found,
                            label: "syllable range".to_string(),
                        },
                        next.span,
                    )),
                }
            }
            TokenKind::Hyphen => {
                let after = c.reader.expect_loose(TokenKind::Digits, "syllable range")?;
                let max = parse_int(&after)?;
                c.reader.expect_loose(TokenKind::RightParen, "syllable range")?;
                Ok(SyllableRange {
                    min: None,
                    max: Some(max),
                })
            }
            TokenKind::RightParen => {
                Err(SyntaxError::new(SyntaxErrorKind::EmptyRange, first.span))
            }
            found => Err(SyntaxError::new(
                SyntaxErrorKind::Expected {
                    expected: TokenKind::Digits,
                    found,
                    label: "syllable range".to_string(),
                },
                first.span,
            )),
        }
    }

    /// `::=id` (match) or `::!=id` (unique). The first colon is consumed.
    fn parse_carrier(&self, c: &mut Compiler<'_>) -> ParseResult<Carrier> {
        c.reader.expect(TokenKind::Colon, "carrier")?;
        let kind = if c.reader.peek_kind() == TokenKind::Exclamation {
            c.reader.read();
            CarrierKind::Unique
        } else {
            CarrierKind::Match
        };

        let token = c.reader.expect(TokenKind::Text, "carrier name")?;
        let Some(mut id) = token.text.strip_prefix('=').map(str::to_string) else {
            return Err(SyntaxError::new(SyntaxErrorKind::EmptyCarrier, token.span));
        };
        // Absorb alphanumeric continuation tokens ("=a" "1" is the id `a1`).
        loop {
            match c.reader.peek_kind() {
                TokenKind::Text | TokenKind::Digits => {
                    id.push_str(&c.reader.read().text);
                }
                _ => break,
            }
        }
        if id.is_empty() {
            return Err(SyntaxError::new(SyntaxErrorKind::EmptyCarrier, token.span));
        }
        Ok(Carrier { id, kind })
    }
}

impl SyntaxParser for QueryParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        let name_token = c.reader.expect_loose(TokenKind::Text, "table name")?;
        let (table, subtype) = self.split_subtype(c, &name_token);
        let mut query = Query::table(table);
        self.apply_subtype(c, &mut query, subtype, name_token.span);

        loop {
            let token = c.reader.read_loose();
            match token.kind {
                TokenKind::RightAngle => {
                    let span = self.open_span.merge(token.span);
                    c.emit(Rst::new(span, RstKind::Query(query)));
                    return Ok(Step::Done);
                }
                TokenKind::Hyphen => {
                    let include = if c.reader.peek_kind() == TokenKind::Exclamation {
                        c.reader.read();
                        false
                    } else {
                        true
                    };
                    match c.reader.expect(TokenKind::Text, "class name") {
                        Ok(class_token) => {
                            let (class_name, subtype) = self.split_subtype(c, &class_token);
                            self.apply_subtype(c, &mut query, subtype, class_token.span);
                            query.class_filter.push(ClassFilterRule {
                                class_name,
                                include,
                            });
                        }
                        Err(error) => c.report(error.into_diagnostic()),
                    }
                }
                TokenKind::Question | TokenKind::Tilde => {
                    let positive = token.kind == TokenKind::Question;
                    match c.reader.expect(TokenKind::Regex, "regex filter") {
                        Ok(regex_token) => match c.compile_regex(&regex_token) {
                            Ok(regex) => query.regex_filters.push(RegexFilter { positive, regex }),
                            Err(error) => c.report(error.into_diagnostic()),
                        },
                        Err(error) => c.report(error.into_diagnostic()),
                    }
                }
                TokenKind::LeftParen => match self.parse_range(c) {
                    Ok(range) => query.syllables = Some(range),
                    Err(error) => {
                        if error.is_fatal() {
                            return Err(error);
                        }
                        c.report(error.into_diagnostic());
                    }
                },
                TokenKind::Dollar => {
                    query.exclusive = true;
                }
                TokenKind::Colon => match self.parse_carrier(c) {
                    Ok(carrier) => query.carrier = Some(carrier),
                    Err(error) => c.report(error.into_diagnostic()),
                },
                TokenKind::EndOfStream => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a query" },
                        token.span,
                    ));
                }
                found => {
                    c.report(
                        SyntaxError::new(
                            SyntaxErrorKind::Unexpected {
                                found,
                                context: "a query",
                            },
                            token.span,
                        )
                        .into_diagnostic(),
                    );
                }
            }
        }
    }
}
