//! Tag production (`[name:arg;…]`, `[$sub:…]`, `[@expr]`) plus the
//! subroutine-definition, list, and replacer productions that share its
//! argument machinery.

use std::rc::Rc;

use crate::rst::{ChannelVisibility, RantRegex, Rst, RstKind};
use crate::token::{Span, TokenKind};

use super::sequence::finish_sequence;
use super::{
    arith, Compiler, ParseResult, SeqMode, SeqParser, Step, SyntaxError, SyntaxErrorKind,
    SyntaxParser,
};

enum TagKind {
    Function,
    SubCall,
}

enum TagStage {
    Start,
    AfterArg,
}

pub(crate) struct TagParser {
    open_span: Span,
    stage: TagStage,
    kind: TagKind,
    name: String,
    args: Vec<Rc<Rst>>,
    arg_start: usize,
}

impl TagParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self {
            open_span,
            stage: TagStage::Start,
            kind: TagKind::Function,
            name: String::new(),
            args: Vec::new(),
            arg_start: open_span.end,
        }
    }

    fn begin_arg(&mut self, c: &mut Compiler<'_>) -> Step {
        self.arg_start = c.reader.here().start;
        c.push_output();
        Step::Child(Box::new(SeqParser::new(SeqMode::TagArg)))
    }

    fn finalize(&mut self, c: &mut Compiler<'_>, close: Span) -> ParseResult<Step> {
        let span = self.open_span.merge(close);
        let name = self.name.to_lowercase();
        let args = std::mem::take(&mut self.args);

        match self.kind {
            TagKind::SubCall => {
                c.emit(Rst::new(span, RstKind::SubCall { name, args }));
            }
            TagKind::Function => {
                if name == "if" && (args.len() == 2 || args.len() == 3) {
                    let else_branch = args.get(2).cloned();
                    c.emit(Rst::new(
                        span,
                        RstKind::If {
                            cond: args[0].clone(),
                            then_branch: args[1].clone(),
                            else_branch,
                        },
                    ));
                    return Ok(Step::Done);
                }

                if name == "chan" && args.len() == 3 {
                    if let (Some(chan_name), Some(vis_name)) =
                        (literal_text(&args[0]), literal_text(&args[1]))
                    {
                        match ChannelVisibility::from_name(vis_name.trim()) {
                            Some(visibility) => {
                                c.emit(Rst::new(
                                    span,
                                    RstKind::Chan {
                                        name: chan_name.trim().to_string(),
                                        visibility,
                                        body: args[2].clone(),
                                    },
                                ));
                                return Ok(Step::Done);
                            }
                            None => {
                                c.report(
                                    SyntaxError::new(
                                        SyntaxErrorKind::Unexpected {
                                            found: TokenKind::Text,
                                            context: "a channel visibility",
                                        },
                                        args[1].span,
                                    )
                                    .into_diagnostic(),
                                );
                            }
                        }
                    }
                }

                match c.registry.get(&name) {
                    None => {
                        c.report(
                            SyntaxError::new(
                                SyntaxErrorKind::UnknownFunction { name: name.clone() },
                                span,
                            )
                            .into_diagnostic(),
                        );
                    }
                    Some(group) => {
                        if group.overload(args.len()).is_none() {
                            let accepted = group.arities();
                            c.report(
                                SyntaxError::new(
                                    SyntaxErrorKind::WrongArity {
                                        name: name.clone(),
                                        arity: args.len(),
                                        accepted,
                                    },
                                    span,
                                )
                                .into_diagnostic(),
                            );
                        }
                    }
                }
                c.emit(Rst::new(span, RstKind::Tag { name, args }));
            }
        }
        Ok(Step::Done)
    }
}

impl SyntaxParser for TagParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        match self.stage {
            TagStage::Start => {
                match c.reader.peek_loose().kind {
                    TokenKind::Dollar => {
                        c.reader.read_loose();
                        self.kind = TagKind::SubCall;
                    }
                    TokenKind::At => {
                        c.reader.read_loose();
                        return self.parse_arith(c);
                    }
                    _ => {}
                }

                let name = c.reader.expect_loose(TokenKind::Text, "function name")?;
                self.name = name.text.trim().to_string();

                let next = c.reader.read_loose();
                match next.kind {
                    TokenKind::RightBracket => self.finalize(c, next.span),
                    TokenKind::Colon => {
                        self.stage = TagStage::AfterArg;
                        Ok(self.begin_arg(c))
                    }
                    TokenKind::EndOfStream => Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a tag" },
                        next.span,
                    )),
                    found => Err(SyntaxError::new(
                        SyntaxErrorKind::Expected {
                            expected: TokenKind::Colon,
                            found,
                            label: "argument list".to_string(),
                        },
                        next.span,
                    )),
                }
            }
            TagStage::AfterArg => {
                let body = finish_sequence(c, self.arg_start);
                self.args.push(body);

                let token = c.reader.read();
                match token.kind {
                    TokenKind::Semicolon => Ok(self.begin_arg(c)),
                    TokenKind::RightBracket => self.finalize(c, token.span),
                    TokenKind::EndOfStream => Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a tag" },
                        token.span,
                    )),
                    found => Err(SyntaxError::new(
                        SyntaxErrorKind::Expected {
                            expected: TokenKind::RightBracket,
                            found,
                            label: "end of tag".to_string(),
                        },
                        token.span,
                    )),
                }
            }
        }
    }
}

impl TagParser {
    /// `[@…]`: capture the raw source up to the matching `]` and parse it
    /// with the expression grammar.
    fn parse_arith(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        let start = c.reader.here().start;
        let mut depth = 0usize;
        loop {
            match c.reader.peek_kind() {
                TokenKind::EndOfStream => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a tag" },
                        c.reader.here(),
                    ));
                }
                TokenKind::LeftBracket => {
                    depth += 1;
                    c.reader.read();
                }
                TokenKind::RightBracket => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    c.reader.read();
                }
                _ => {
                    c.reader.read();
                }
            }
        }

        let end = c.reader.here().start;
        let close = c.reader.read();
        let span = self.open_span.merge(close.span);
        let kind = arith::parse_expression_tag(&c.source[start..end], span)?;
        c.emit(Rst::new(span, kind));
        Ok(Step::Done)
    }
}

fn literal_text(rst: &Rst) -> Option<&str> {
    match &rst.kind {
        RstKind::Text(text) => Some(text),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Subroutine definitions: `$[name:p1;p2]{body}`
// ---------------------------------------------------------------------

enum SubStage {
    Start,
    Body,
}

pub(crate) struct SubDefParser {
    open_span: Span,
    stage: SubStage,
    name: String,
    params: Vec<String>,
    body_start: usize,
}

impl SubDefParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self {
            open_span,
            stage: SubStage::Start,
            name: String::new(),
            params: Vec::new(),
            body_start: open_span.end,
        }
    }
}

impl SyntaxParser for SubDefParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        match self.stage {
            SubStage::Start => {
                let name = c.reader.expect_loose(TokenKind::Text, "subroutine name")?;
                self.name = name.text.trim().to_string();

                let next = c.reader.read_loose();
                match next.kind {
                    TokenKind::RightBracket => {}
                    TokenKind::Colon => loop {
                        let param = c.reader.expect_loose(TokenKind::Text, "parameter name")?;
                        self.params.push(param.text.trim().to_string());
                        let sep = c.reader.read_loose();
                        match sep.kind {
                            TokenKind::Semicolon => continue,
                            TokenKind::RightBracket => break,
                            TokenKind::EndOfStream => {
                                return Err(SyntaxError::new(
                                    SyntaxErrorKind::UnexpectedEnd {
                                        context: "a subroutine definition",
                                    },
                                    sep.span,
                                ));
                            }
                            found => {
                                return Err(SyntaxError::new(
                                    SyntaxErrorKind::Expected {
                                        expected: TokenKind::RightBracket,
                                        found,
                                        label: "parameter list".to_string(),
                                    },
                                    sep.span,
                                ));
                            }
                        }
                    },
                    TokenKind::EndOfStream => {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::UnexpectedEnd {
                                context: "a subroutine definition",
                            },
                            next.span,
                        ));
                    }
                    found => {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::Expected {
                                expected: TokenKind::RightBracket,
                                found,
                                label: "subroutine header".to_string(),
                            },
                            next.span,
                        ));
                    }
                }

                c.reader.expect_loose(TokenKind::LeftBrace, "subroutine body")?;
                self.body_start = c.reader.here().start;
                c.push_output();
                self.stage = SubStage::Body;
                Ok(Step::Child(Box::new(SeqParser::new(SeqMode::SubBody))))
            }
            SubStage::Body => {
                let body = finish_sequence(c, self.body_start);
                let close = c.reader.expect(TokenKind::RightBrace, "subroutine body")?;
                let span = self.open_span.merge(close.span);

                c.modules.insert(self.name.clone(), body.clone());
                c.emit(Rst::new(
                    span,
                    RstKind::SubDef {
                        name: std::mem::take(&mut self.name),
                        params: std::mem::take(&mut self.params),
                        body,
                    },
                ));
                Ok(Step::Done)
            }
        }
    }
}

// ---------------------------------------------------------------------
// List literals: `@(a;b;c)`
// ---------------------------------------------------------------------

enum ListStage {
    Start,
    AfterItem,
}

pub(crate) struct ListParser {
    open_span: Span,
    stage: ListStage,
    items: Vec<Rc<Rst>>,
    item_start: usize,
}

impl ListParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self {
            open_span,
            stage: ListStage::Start,
            items: Vec::new(),
            item_start: open_span.end,
        }
    }

    fn begin_item(&mut self, c: &mut Compiler<'_>) -> Step {
        self.item_start = c.reader.here().start;
        c.push_output();
        Step::Child(Box::new(SeqParser::new(SeqMode::ListItem)))
    }
}

impl SyntaxParser for ListParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        match self.stage {
            ListStage::Start => {
                self.stage = ListStage::AfterItem;
                Ok(self.begin_item(c))
            }
            ListStage::AfterItem => {
                let item = finish_sequence(c, self.item_start);
                self.items.push(item);

                let token = c.reader.read();
                match token.kind {
                    TokenKind::Semicolon => Ok(self.begin_item(c)),
                    TokenKind::RightParen => {
                        let span = self.open_span.merge(token.span);
                        let items = std::mem::take(&mut self.items);
                        c.emit(Rst::new(span, RstKind::List(items)));
                        Ok(Step::Done)
                    }
                    TokenKind::EndOfStream => Err(SyntaxError::new(
                        SyntaxErrorKind::UnexpectedEnd { context: "a list" },
                        token.span,
                    )),
                    found => Err(SyntaxError::new(
                        SyntaxErrorKind::Expected {
                            expected: TokenKind::RightParen,
                            found,
                            label: "end of list".to_string(),
                        },
                        token.span,
                    )),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// Replacers: `%/regex/flags:subject;replacement%`
// ---------------------------------------------------------------------

enum ReplaceStage {
    Start,
    AfterSubject,
    AfterReplacement,
}

pub(crate) struct ReplaceParser {
    open_span: Span,
    stage: ReplaceStage,
    regex: Option<RantRegex>,
    subject: Option<Rc<Rst>>,
    part_start: usize,
}

impl ReplaceParser {
    pub(crate) fn new(open_span: Span) -> Self {
        Self {
            open_span,
            stage: ReplaceStage::Start,
            regex: None,
            subject: None,
            part_start: open_span.end,
        }
    }
}

impl SyntaxParser for ReplaceParser {
    fn step(&mut self, c: &mut Compiler<'_>) -> ParseResult<Step> {
        match self.stage {
            ReplaceStage::Start => {
                let token = c.reader.expect(TokenKind::Regex, "replacer pattern")?;
                self.regex = Some(c.compile_regex(&token)?);
                c.reader.expect(TokenKind::Colon, "replacer subject")?;

                self.part_start = c.reader.here().start;
                c.push_output();
                self.stage = ReplaceStage::AfterSubject;
                Ok(Step::Child(Box::new(SeqParser::new(SeqMode::ReplaceSubject))))
            }
            ReplaceStage::AfterSubject => {
                self.subject = Some(finish_sequence(c, self.part_start));
                c.reader.expect(TokenKind::Semicolon, "replacement")?;

                self.part_start = c.reader.here().start;
                c.push_output();
                self.stage = ReplaceStage::AfterReplacement;
                Ok(Step::Child(Box::new(SeqParser::new(
                    SeqMode::ReplaceReplacement,
                ))))
            }
            ReplaceStage::AfterReplacement => {
                let replacement = finish_sequence(c, self.part_start);
                let close = c.reader.expect(TokenKind::Percent, "end of replacer")?;
                let span = self.open_span.merge(close.span);

                let regex = self.regex.take().ok_or_else(|| {
                    SyntaxError::new(
                        SyntaxErrorKind::InvalidRegex {
                            message: "replacer lost its pattern".to_string(),
                        },
                        span,
                    )
                })?;
                let subject = self.subject.take().ok_or_else(|| {
                    SyntaxError::new(
                        SyntaxErrorKind::InvalidExpression {
                            message: "replacer lost its subject".to_string(),
                        },
                        span,
                    )
                })?;

                c.emit(Rst::new(
                    span,
                    RstKind::Replace {
                        regex,
                        subject,
                        replacement,
                    },
                ));
                Ok(Step::Done)
            }
        }
    }
}
