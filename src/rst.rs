//! Runtime syntax tree: the executable form a pattern compiles to.
//!
//! Nodes are immutable once built, compare structurally, and round-trip
//! through the binary codec in `codec`.

use std::fmt;
use std::rc::Rc;

use crate::query::Query;
use crate::token::Span;

/// Visibility of an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelVisibility {
    /// Appears in the run result; passes appends through to parent channels.
    Public,
    /// Absorbs appends; never appears in the run result.
    Private,
    /// Absorbs appends; flushed wholesale into its parent when closed.
    Internal,
}

impl ChannelVisibility {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "public" => Some(ChannelVisibility::Public),
            "private" => Some(ChannelVisibility::Private),
            "internal" => Some(ChannelVisibility::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelVisibility::Public => write!(f, "public"),
            ChannelVisibility::Private => write!(f, "private"),
            ChannelVisibility::Internal => write!(f, "internal"),
        }
    }
}

/// Random character classes produced by escapes like `\d` and `\8,x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Digit,
    NonZeroDigit,
    HexLower,
    HexUpper,
    Lower,
    Upper,
    Alnum,
}

impl CharClass {
    pub fn from_escape(c: char) -> Option<Self> {
        match c {
            'd' => Some(CharClass::Digit),
            'N' => Some(CharClass::NonZeroDigit),
            'x' => Some(CharClass::HexLower),
            'X' => Some(CharClass::HexUpper),
            'c' => Some(CharClass::Lower),
            'C' => Some(CharClass::Upper),
            'w' => Some(CharClass::Alnum),
            _ => None,
        }
    }

    pub fn alphabet(self) -> &'static [u8] {
        match self {
            CharClass::Digit => b"0123456789",
            CharClass::NonZeroDigit => b"123456789",
            CharClass::HexLower => b"0123456789abcdef",
            CharClass::HexUpper => b"0123456789ABCDEF",
            CharClass::Lower => b"abcdefghijklmnopqrstuvwxyz",
            CharClass::Upper => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharClass::Alnum => b"abcdefghijklmnopqrstuvwxyz0123456789",
        }
    }
}

/// A compiled regex that remembers its written form. Equality and
/// serialization go through the source text; the compiled matcher is
/// rebuilt on load.
#[derive(Debug, Clone)]
pub struct RantRegex {
    pub source: String,
    pub flags: String,
    regex: regex::Regex,
}

impl RantRegex {
    pub fn new(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let pattern = if flags.contains('i') {
            format!("(?i){}", source)
        } else {
            source.to_string()
        };
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex: regex::Regex::new(&pattern)?,
        })
    }

    /// Split a raw `/body/flags` token into body and flags.
    pub fn split_token(raw: &str) -> Option<(&str, &str)> {
        let rest = raw.strip_prefix('/')?;
        let close = rest.rfind('/')?;
        Some((&rest[..close], &rest[close + 1..]))
    }

    pub fn regex(&self) -> &regex::Regex {
        &self.regex
    }
}

impl PartialEq for RantRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

/// Binary operators of the `[@…]` arithmetic sublanguage. Comparisons
/// evaluate to 1 or 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArithExpr {
    Number(f64),
    Var(String),
    Neg(Box<ArithExpr>),
    Binary {
        op: ArithOp,
        lhs: Box<ArithExpr>,
        rhs: Box<ArithExpr>,
    },
}

/// One branch of a block, with an optional selection weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub body: Rc<Rst>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub branches: Vec<Branch>,
}

/// An executable node. The span points back into the pattern source that
/// produced it (or `0..0` for synthesized nodes).
#[derive(Debug, Clone, PartialEq)]
pub struct Rst {
    pub span: Span,
    pub kind: RstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RstKind {
    Seq(Vec<Rc<Rst>>),
    Text(String),
    Block(BlockNode),
    Tag {
        name: String,
        args: Vec<Rc<Rst>>,
    },
    Query(Query),
    GetVar {
        name: String,
    },
    SetVar {
        name: String,
        expr: ArithExpr,
    },
    Arith(ArithExpr),
    If {
        cond: Rc<Rst>,
        then_branch: Rc<Rst>,
        else_branch: Option<Rc<Rst>>,
    },
    List(Vec<Rc<Rst>>),
    Chan {
        name: String,
        visibility: ChannelVisibility,
        body: Rc<Rst>,
    },
    SubDef {
        name: String,
        params: Vec<String>,
        body: Rc<Rst>,
    },
    SubCall {
        name: String,
        args: Vec<Rc<Rst>>,
    },
    Replace {
        regex: RantRegex,
        subject: Rc<Rst>,
        replacement: Rc<Rst>,
    },
    Chars {
        class: CharClass,
        count: u32,
    },
    Article,
    Nop,
}

impl Rst {
    pub fn new(span: Span, kind: RstKind) -> Self {
        Self { span, kind }
    }

    /// Wrap a node list into a single node, avoiding a needless `Seq` for
    /// the common one-element case.
    pub fn sequence(span: Span, mut nodes: Vec<Rst>) -> Rst {
        match nodes.len() {
            0 => Rst::new(span, RstKind::Nop),
            1 => nodes.pop().unwrap(),
            _ => Rst::new(span, RstKind::Seq(nodes.into_iter().map(Rc::new).collect())),
        }
    }

    /// Stable type id used by the binary codec.
    pub(crate) fn type_id(&self) -> u8 {
        match &self.kind {
            RstKind::Seq(_) => 0,
            RstKind::Text(_) => 1,
            RstKind::Block(_) => 2,
            RstKind::Tag { .. } => 3,
            RstKind::Query(_) => 4,
            RstKind::GetVar { .. } => 5,
            RstKind::SetVar { .. } => 6,
            RstKind::Arith(_) => 7,
            RstKind::If { .. } => 8,
            RstKind::List(_) => 9,
            RstKind::Chan { .. } => 10,
            RstKind::SubDef { .. } => 11,
            RstKind::SubCall { .. } => 12,
            RstKind::Replace { .. } => 13,
            RstKind::Chars { .. } => 14,
            RstKind::Article => 15,
            RstKind::Nop => 16,
        }
    }
}
