//! Binary program codec: `"RPGM"` magic followed by the serialized root
//! node. Integers are LEB128 varints, floats are little-endian `f64`,
//! strings are length-prefixed UTF-8. Every node is written as its stable
//! type id, its span, and a per-variant payload.

use std::rc::Rc;

use crate::error::LoadError;
use crate::query::{Carrier, CarrierKind, ClassFilterRule, Query, RegexFilter, SyllableRange};
use crate::rst::{
    ArithExpr, ArithOp, BlockNode, Branch, ChannelVisibility, CharClass, RantRegex, Rst, RstKind,
};
use crate::token::Span;

pub const MAGIC: &[u8; 4] = b"RPGM";

pub fn serialize_program(root: &Rst) -> Vec<u8> {
    let mut w = Writer {
        buf: MAGIC.to_vec(),
    };
    w.node(root);
    w.buf
}

pub fn deserialize_program(bytes: &[u8]) -> Result<Rst, LoadError> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(LoadError::BadMagic);
    }
    let mut r = Reader {
        data: bytes,
        pos: MAGIC.len(),
    };
    r.node()
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn float(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.varint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn nodes(&mut self, nodes: &[Rc<Rst>]) {
        self.varint(nodes.len() as u64);
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&mut self, rst: &Rst) {
        self.varint(rst.type_id() as u64);
        self.varint(rst.span.start as u64);
        self.varint(rst.span.end as u64);

        match &rst.kind {
            RstKind::Seq(children) => self.nodes(children),
            RstKind::Text(text) => self.string(text),
            RstKind::Block(block) => {
                self.varint(block.branches.len() as u64);
                for branch in &block.branches {
                    match branch.weight {
                        Some(weight) => {
                            self.byte(1);
                            self.float(weight);
                        }
                        None => self.byte(0),
                    }
                    self.node(&branch.body);
                }
            }
            RstKind::Tag { name, args } => {
                self.string(name);
                self.nodes(args);
            }
            RstKind::Query(query) => self.query(query),
            RstKind::GetVar { name } => self.string(name),
            RstKind::SetVar { name, expr } => {
                self.string(name);
                self.expr(expr);
            }
            RstKind::Arith(expr) => self.expr(expr),
            RstKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.node(cond);
                self.node(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        self.byte(1);
                        self.node(else_branch);
                    }
                    None => self.byte(0),
                }
            }
            RstKind::List(items) => self.nodes(items),
            RstKind::Chan {
                name,
                visibility,
                body,
            } => {
                self.string(name);
                self.byte(visibility_id(*visibility));
                self.node(body);
            }
            RstKind::SubDef { name, params, body } => {
                self.string(name);
                self.varint(params.len() as u64);
                for param in params {
                    self.string(param);
                }
                self.node(body);
            }
            RstKind::SubCall { name, args } => {
                self.string(name);
                self.nodes(args);
            }
            RstKind::Replace {
                regex,
                subject,
                replacement,
            } => {
                self.string(&regex.source);
                self.string(&regex.flags);
                self.node(subject);
                self.node(replacement);
            }
            RstKind::Chars { class, count } => {
                self.byte(class_id(*class));
                self.varint(*count as u64);
            }
            RstKind::Article | RstKind::Nop => {}
        }
    }

    fn query(&mut self, query: &Query) {
        self.string(&query.table);
        match &query.subtype {
            Some(subtype) => {
                self.byte(1);
                self.string(subtype);
            }
            None => self.byte(0),
        }
        self.varint(query.class_filter.len() as u64);
        for rule in &query.class_filter {
            self.string(&rule.class_name);
            self.byte(rule.include as u8);
        }
        self.varint(query.regex_filters.len() as u64);
        for filter in &query.regex_filters {
            self.byte(filter.positive as u8);
            self.string(&filter.regex.source);
            self.string(&filter.regex.flags);
        }
        match &query.syllables {
            Some(range) => {
                self.byte(1);
                self.opt_u32(range.min);
                self.opt_u32(range.max);
            }
            None => self.byte(0),
        }
        self.byte(query.exclusive as u8);
        match &query.carrier {
            Some(carrier) => {
                self.byte(1);
                self.string(&carrier.id);
                self.byte(match carrier.kind {
                    CarrierKind::Match => 0,
                    CarrierKind::Unique => 1,
                });
            }
            None => self.byte(0),
        }
    }

    fn opt_u32(&mut self, v: Option<u32>) {
        match v {
            Some(v) => {
                self.byte(1);
                self.varint(v as u64);
            }
            None => self.byte(0),
        }
    }

    fn expr(&mut self, expr: &ArithExpr) {
        match expr {
            ArithExpr::Number(v) => {
                self.byte(0);
                self.float(*v);
            }
            ArithExpr::Var(name) => {
                self.byte(1);
                self.string(name);
            }
            ArithExpr::Neg(inner) => {
                self.byte(2);
                self.expr(inner);
            }
            ArithExpr::Binary { op, lhs, rhs } => {
                self.byte(3);
                self.byte(op_id(*op));
                self.expr(lhs);
                self.expr(rhs);
            }
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, LoadError> {
        let b = *self.data.get(self.pos).ok_or(LoadError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, LoadError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(LoadError::UnexpectedEof);
            }
        }
    }

    fn float(&mut self) -> Result<f64, LoadError> {
        if self.pos + 8 > self.data.len() {
            return Err(LoadError::UnexpectedEof);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(f64::from_le_bytes(bytes))
    }

    fn string(&mut self) -> Result<String, LoadError> {
        let len = self.varint()? as usize;
        if self.pos + len > self.data.len() {
            return Err(LoadError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        String::from_utf8(slice.to_vec()).map_err(|_| LoadError::InvalidUtf8)
    }

    fn bool(&mut self) -> Result<bool, LoadError> {
        Ok(self.byte()? != 0)
    }

    fn nodes(&mut self) -> Result<Vec<Rc<Rst>>, LoadError> {
        let count = self.varint()? as usize;
        let mut nodes = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            nodes.push(Rc::new(self.node()?));
        }
        Ok(nodes)
    }

    fn node(&mut self) -> Result<Rst, LoadError> {
        let type_id = self.varint()?;
        let start = self.varint()? as usize;
        let end = self.varint()? as usize;
        let span = Span::new(start, end);

        let kind = match type_id {
            0 => RstKind::Seq(self.nodes()?),
            1 => RstKind::Text(self.string()?),
            2 => {
                let count = self.varint()? as usize;
                let mut branches = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let weight = if self.bool()? {
                        Some(self.float()?)
                    } else {
                        None
                    };
                    branches.push(Branch {
                        body: Rc::new(self.node()?),
                        weight,
                    });
                }
                RstKind::Block(BlockNode { branches })
            }
            3 => RstKind::Tag {
                name: self.string()?,
                args: self.nodes()?,
            },
            4 => RstKind::Query(self.query()?),
            5 => RstKind::GetVar {
                name: self.string()?,
            },
            6 => RstKind::SetVar {
                name: self.string()?,
                expr: self.expr()?,
            },
            7 => RstKind::Arith(self.expr()?),
            8 => {
                let cond = Rc::new(self.node()?);
                let then_branch = Rc::new(self.node()?);
                let else_branch = if self.bool()? {
                    Some(Rc::new(self.node()?))
                } else {
                    None
                };
                RstKind::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            9 => RstKind::List(self.nodes()?),
            10 => {
                let name = self.string()?;
                let visibility = visibility_from_id(self.byte()?)?;
                let body = Rc::new(self.node()?);
                RstKind::Chan {
                    name,
                    visibility,
                    body,
                }
            }
            11 => {
                let name = self.string()?;
                let count = self.varint()? as usize;
                let mut params = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    params.push(self.string()?);
                }
                let body = Rc::new(self.node()?);
                RstKind::SubDef { name, params, body }
            }
            12 => RstKind::SubCall {
                name: self.string()?,
                args: self.nodes()?,
            },
            13 => {
                let source = self.string()?;
                let flags = self.string()?;
                let regex = RantRegex::new(&source, &flags)
                    .map_err(|e| LoadError::InvalidRegex(e.to_string()))?;
                let subject = Rc::new(self.node()?);
                let replacement = Rc::new(self.node()?);
                RstKind::Replace {
                    regex,
                    subject,
                    replacement,
                }
            }
            14 => RstKind::Chars {
                class: class_from_id(self.byte()?)?,
                count: self.varint()? as u32,
            },
            15 => RstKind::Article,
            16 => RstKind::Nop,
            other => return Err(LoadError::UnknownTypeId(other)),
        };

        Ok(Rst::new(span, kind))
    }

    fn query(&mut self) -> Result<Query, LoadError> {
        let table = self.string()?;
        let subtype = if self.bool()? {
            Some(self.string()?)
        } else {
            None
        };

        let rule_count = self.varint()? as usize;
        let mut class_filter = Vec::with_capacity(rule_count.min(4096));
        for _ in 0..rule_count {
            let class_name = self.string()?;
            let include = self.bool()?;
            class_filter.push(ClassFilterRule {
                class_name,
                include,
            });
        }

        let filter_count = self.varint()? as usize;
        let mut regex_filters = Vec::with_capacity(filter_count.min(4096));
        for _ in 0..filter_count {
            let positive = self.bool()?;
            let source = self.string()?;
            let flags = self.string()?;
            let regex = RantRegex::new(&source, &flags)
                .map_err(|e| LoadError::InvalidRegex(e.to_string()))?;
            regex_filters.push(RegexFilter { positive, regex });
        }

        let syllables = if self.bool()? {
            let min = self.opt_u32()?;
            let max = self.opt_u32()?;
            Some(SyllableRange { min, max })
        } else {
            None
        };

        let exclusive = self.bool()?;
        let carrier = if self.bool()? {
            let id = self.string()?;
            let kind = match self.byte()? {
                0 => CarrierKind::Match,
                1 => CarrierKind::Unique,
                other => return Err(LoadError::UnknownTypeId(other as u64)),
            };
            Some(Carrier { id, kind })
        } else {
            None
        };

        Ok(Query {
            table,
            subtype,
            class_filter,
            regex_filters,
            syllables,
            exclusive,
            carrier,
        })
    }

    fn opt_u32(&mut self) -> Result<Option<u32>, LoadError> {
        if self.bool()? {
            Ok(Some(self.varint()? as u32))
        } else {
            Ok(None)
        }
    }

    fn expr(&mut self) -> Result<ArithExpr, LoadError> {
        match self.byte()? {
            0 => Ok(ArithExpr::Number(self.float()?)),
            1 => Ok(ArithExpr::Var(self.string()?)),
            2 => Ok(ArithExpr::Neg(Box::new(self.expr()?))),
            3 => {
                let op = op_from_id(self.byte()?)?;
                let lhs = Box::new(self.expr()?);
                let rhs = Box::new(self.expr()?);
                Ok(ArithExpr::Binary { op, lhs, rhs })
            }
            other => Err(LoadError::UnknownTypeId(other as u64)),
        }
    }
}

fn visibility_id(v: ChannelVisibility) -> u8 {
    match v {
        ChannelVisibility::Public => 0,
        ChannelVisibility::Private => 1,
        ChannelVisibility::Internal => 2,
    }
}

fn visibility_from_id(id: u8) -> Result<ChannelVisibility, LoadError> {
    match id {
        0 => Ok(ChannelVisibility::Public),
        1 => Ok(ChannelVisibility::Private),
        2 => Ok(ChannelVisibility::Internal),
        other => Err(LoadError::UnknownTypeId(other as u64)),
    }
}

fn class_id(class: CharClass) -> u8 {
    match class {
        CharClass::Digit => 0,
        CharClass::NonZeroDigit => 1,
        CharClass::HexLower => 2,
        CharClass::HexUpper => 3,
        CharClass::Lower => 4,
        CharClass::Upper => 5,
        CharClass::Alnum => 6,
    }
}

fn class_from_id(id: u8) -> Result<CharClass, LoadError> {
    match id {
        0 => Ok(CharClass::Digit),
        1 => Ok(CharClass::NonZeroDigit),
        2 => Ok(CharClass::HexLower),
        3 => Ok(CharClass::HexUpper),
        4 => Ok(CharClass::Lower),
        5 => Ok(CharClass::Upper),
        6 => Ok(CharClass::Alnum),
        other => Err(LoadError::UnknownTypeId(other as u64)),
    }
}

fn op_id(op: ArithOp) -> u8 {
    match op {
        ArithOp::Add => 0,
        ArithOp::Sub => 1,
        ArithOp::Mul => 2,
        ArithOp::Div => 3,
        ArithOp::Rem => 4,
        ArithOp::Lt => 5,
        ArithOp::Le => 6,
        ArithOp::Gt => 7,
        ArithOp::Ge => 8,
        ArithOp::Eq => 9,
        ArithOp::Ne => 10,
    }
}

fn op_from_id(id: u8) -> Result<ArithOp, LoadError> {
    match id {
        0 => Ok(ArithOp::Add),
        1 => Ok(ArithOp::Sub),
        2 => Ok(ArithOp::Mul),
        3 => Ok(ArithOp::Div),
        4 => Ok(ArithOp::Rem),
        5 => Ok(ArithOp::Lt),
        6 => Ok(ArithOp::Le),
        7 => Ok(ArithOp::Gt),
        8 => Ok(ArithOp::Ge),
        9 => Ok(ArithOp::Eq),
        10 => Ok(ArithOp::Ne),
        other => Err(LoadError::UnknownTypeId(other as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        let mut w = Writer { buf: Vec::new() };
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            w.varint(v);
        }
        let mut r = Reader {
            data: &w.buf,
            pos: 0,
        };
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            assert_eq!(r.varint().unwrap(), v);
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(matches!(
            deserialize_program(b"NOPE\x00"),
            Err(LoadError::BadMagic)
        ));
    }

    #[test]
    fn unknown_type_id_is_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[99, 0, 0]);
        assert!(matches!(
            deserialize_program(&bytes),
            Err(LoadError::UnknownTypeId(99))
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let root = Rst::new(Span::new(0, 5), RstKind::Text("hello".to_string()));
        let bytes = serialize_program(&root);
        assert!(matches!(
            deserialize_program(&bytes[..bytes.len() - 1]),
            Err(LoadError::UnexpectedEof)
        ));
    }
}
