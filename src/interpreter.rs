//! Tree-walking interpreter for compiled patterns.
//!
//! One `Interpreter` is one execution: it owns the RNG, the channel stack,
//! block and variable scopes, synchronizers, marks and targets, and the
//! formatting state. Programs are immutable and may be executed any number
//! of times, each with a fresh interpreter.

use std::collections::HashMap;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::channel::ChannelStack;
use crate::dictionary::Dictionary;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::format::{
    apply_capitalization, article_for, format_number, CapsCarry, Capitalization, NumberFormat,
    OutputFormat,
};
use crate::query::{self, CarrierState};
use crate::registry::{ArgValue, FunctionRegistry, ParamMode};
use crate::rst::{ArithExpr, ArithOp, Rst, RstKind};
use crate::selector::{Selector, SelectorStrategy, Synchronizer};
use crate::token::Span;

/// Execution budgets, checked at every step, block backedge, and append.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_steps: u64,
    pub max_output: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_output: 1_000_000,
            max_depth: 1_000,
        }
    }
}

/// Values held by pattern variables.
#[derive(Debug, Clone, PartialEq)]
pub enum RantValue {
    Text(String),
    Num(f64),
    List(Vec<RantValue>),
}

impl RantValue {
    pub fn to_display_string(&self, format: NumberFormat) -> String {
        match self {
            RantValue::Text(s) => s.clone(),
            RantValue::Num(v) => format_number(*v, format),
            RantValue::List(items) => items
                .iter()
                .map(|v| v.to_display_string(format))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Attributes armed by tags for the next block to consume.
#[derive(Default)]
struct PendingBlockAttrs {
    rep: Option<usize>,
    sep: Option<Rc<Rst>>,
    before: Option<Rc<Rst>>,
    after: Option<Rc<Rst>>,
    strategy: Option<SelectorStrategy>,
    sync: Option<String>,
}

struct BlockFrame {
    /// 1-based index of the iteration currently executing.
    iteration: usize,
    total: usize,
}

enum Chooser {
    Local(Selector),
    Sync(String),
}

struct Hole {
    name: String,
    channel: String,
    offset: usize,
}

pub struct Interpreter<'a> {
    registry: &'a FunctionRegistry,
    dictionary: Option<&'a Dictionary>,
    rng: Pcg64,
    channels: ChannelStack,
    blocks: Vec<BlockFrame>,
    scopes: Vec<HashMap<String, RantValue>>,
    subs: HashMap<String, (Vec<String>, Rc<Rst>)>,
    syncs: HashMap<String, Synchronizer>,
    marks: HashMap<String, (String, usize)>,
    holes: Vec<Hole>,
    sends: HashMap<String, String>,
    carriers: CarrierState,
    pending: PendingBlockAttrs,
    fmt: Vec<OutputFormat>,
    caps_carry: CapsCarry,
    /// Whitespace buffered between an article placeholder and the word
    /// that resolves it.
    article: Option<String>,
    limits: Limits,
    steps: u64,
    depth: usize,
    printed: usize,
    current_span: Span,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        seed: u64,
        registry: &'a FunctionRegistry,
        dictionary: Option<&'a Dictionary>,
        limits: Limits,
    ) -> Self {
        Self {
            registry,
            dictionary,
            rng: Pcg64::seed_from_u64(seed),
            channels: ChannelStack::new(),
            blocks: Vec::new(),
            scopes: vec![HashMap::new()],
            subs: HashMap::new(),
            syncs: HashMap::new(),
            marks: HashMap::new(),
            holes: Vec::new(),
            sends: HashMap::new(),
            carriers: CarrierState::default(),
            pending: PendingBlockAttrs::default(),
            fmt: vec![OutputFormat::default()],
            caps_carry: CapsCarry::default(),
            article: None,
            limits,
            steps: 0,
            depth: 0,
            printed: 0,
            current_span: Span::default(),
        }
    }

    /// Bind a variable in the innermost scope. Program arguments are bound
    /// here before execution starts.
    pub fn define_var(&mut self, name: &str, value: RantValue) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), value);
    }

    /// Execute a root node to completion, resolve deferred sends, and
    /// return the recorded channels, main first.
    pub fn run_root(mut self, root: &Rst) -> Result<Vec<(String, String)>, RuntimeError> {
        self.execute(root)?;
        self.flush_article()?;

        let holes = std::mem::take(&mut self.holes);
        let sends = std::mem::take(&mut self.sends);
        let channels = std::mem::replace(&mut self.channels, ChannelStack::new());
        let mut results = channels.finish();

        // Deferred sends: patch every hole, earliest first, shifting later
        // offsets by what has been inserted so far.
        for (channel_name, text) in results.iter_mut() {
            let mut channel_holes: Vec<&Hole> =
                holes.iter().filter(|h| h.channel == *channel_name).collect();
            channel_holes.sort_by_key(|h| h.offset);
            let mut shift = 0usize;
            for hole in channel_holes {
                if let Some(fill) = sends.get(&hole.name) {
                    text.insert_str(hole.offset + shift, fill);
                    shift += fill.len();
                }
            }
        }

        Ok(results)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    pub(crate) fn execute(&mut self, rst: &Rst) -> Result<(), RuntimeError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StepBudget {
                    limit: self.limits.max_steps,
                },
                rst.span,
            ));
        }
        if self.depth >= self.limits.max_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::DepthBudget {
                    limit: self.limits.max_depth,
                },
                rst.span,
            ));
        }

        self.depth += 1;
        let saved = self.current_span;
        self.current_span = rst.span;
        let result = self.execute_kind(rst);
        self.current_span = saved;
        self.depth -= 1;
        result
    }

    fn execute_kind(&mut self, rst: &Rst) -> Result<(), RuntimeError> {
        match &rst.kind {
            RstKind::Nop => Ok(()),
            RstKind::Seq(children) => {
                for child in children {
                    self.execute(child)?;
                }
                Ok(())
            }
            RstKind::Text(text) => self.print(text),
            RstKind::Chars { class, count } => {
                let count = *count as usize;
                if self.printed + count > self.limits.max_output {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::OutputBudget {
                            limit: self.limits.max_output,
                        },
                        rst.span,
                    ));
                }
                let alphabet = class.alphabet();
                let mut out = String::with_capacity(count);
                for _ in 0..count {
                    out.push(alphabet[self.rng.gen_range(0..alphabet.len())] as char);
                }
                self.print(&out)
            }
            RstKind::Article => {
                self.flush_article()?;
                self.article = Some(String::new());
                Ok(())
            }
            RstKind::Block(block) => self.execute_block(rst.span, block),
            RstKind::Tag { name, args } => self.execute_tag(rst.span, name, args),
            RstKind::Query(q) => {
                let text = query::evaluate(q, self.dictionary, &mut self.carriers, &mut self.rng);
                self.print(&text)
            }
            RstKind::GetVar { name } => {
                let Some(value) = self.get_var(name).cloned() else {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UnknownVariable { name: name.clone() },
                        rst.span,
                    ));
                };
                let text = value.to_display_string(self.number_format());
                self.print(&text)
            }
            RstKind::SetVar { name, expr } => {
                let value = self.eval_arith(expr, rst.span)?;
                self.set_var(name, RantValue::Num(value));
                Ok(())
            }
            RstKind::Arith(expr) => {
                let value = self.eval_arith(expr, rst.span)?;
                self.print_number(value)
            }
            RstKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.cook(cond)?;
                if is_truthy(&cond) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            RstKind::List(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(self.cook(item)?);
                }
                self.print(&rendered.join(" "))
            }
            RstKind::Chan {
                name,
                visibility,
                body,
            } => {
                self.channels.push(name, *visibility);
                self.fmt.push(*self.fmt.last().unwrap());
                let result = self.execute(body);
                self.fmt.pop();
                self.channels.pop();
                result
            }
            RstKind::SubDef { name, params, body } => {
                self.subs
                    .insert(name.clone(), (params.clone(), body.clone()));
                Ok(())
            }
            RstKind::SubCall { name, args } => self.execute_sub_call(rst.span, name, args),
            RstKind::Replace {
                regex,
                subject,
                replacement,
            } => {
                let subject = self.cook(subject)?;
                let replacement = self.cook(replacement)?;
                let replaced = regex.regex().replace_all(&subject, replacement.as_str());
                self.print(&replaced)
            }
        }
    }

    fn execute_block(&mut self, span: Span, block: &crate::rst::BlockNode) -> Result<(), RuntimeError> {
        let attrs = std::mem::take(&mut self.pending);
        let n = block.branches.len();
        if n == 0 {
            return Ok(());
        }
        let total = attrs.rep.unwrap_or(1);

        let weights: Option<Vec<f64>> = if block.branches.iter().any(|b| b.weight.is_some()) {
            Some(
                block
                    .branches
                    .iter()
                    .map(|b| b.weight.unwrap_or(1.0))
                    .collect(),
            )
        } else {
            None
        };

        let mut chooser = match attrs.sync {
            Some(name) => {
                let seed = self.rng.gen();
                self.syncs
                    .entry(name.clone())
                    .or_insert_with(|| Synchronizer::new(SelectorStrategy::default(), seed));
                Chooser::Sync(name)
            }
            None => {
                let seed = self.rng.gen();
                Chooser::Local(Selector::new(attrs.strategy.unwrap_or_default(), seed))
            }
        };

        self.blocks.push(BlockFrame {
            iteration: 0,
            total,
        });

        let result = (|| -> Result<(), RuntimeError> {
            for k in 0..total {
                // Loop backedge: repeaters must stay inside the step budget.
                self.steps += 1;
                if self.steps > self.limits.max_steps {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::StepBudget {
                            limit: self.limits.max_steps,
                        },
                        span,
                    ));
                }

                if k > 0 {
                    if let Some(sep) = &attrs.sep {
                        self.execute(sep)?;
                    }
                }
                if let Some(frame) = self.blocks.last_mut() {
                    frame.iteration = k + 1;
                }
                if let Some(before) = &attrs.before {
                    self.execute(before)?;
                }

                let index = match &mut chooser {
                    Chooser::Local(selector) => selector.next_index(n, weights.as_deref()),
                    Chooser::Sync(name) => match self.syncs.get_mut(name) {
                        Some(sync) => sync.index_at(k, n, weights.as_deref()),
                        None => 0,
                    },
                };

                self.fmt.push(*self.fmt.last().unwrap());
                let branch_result = self.execute(&block.branches[index].body);
                self.fmt.pop();
                branch_result?;

                if let Some(after) = &attrs.after {
                    self.execute(after)?;
                }
            }
            Ok(())
        })();

        self.blocks.pop();
        result
    }

    fn execute_tag(&mut self, span: Span, name: &str, args: &[Rc<Rst>]) -> Result<(), RuntimeError> {
        let registry = self.registry;
        let Some(group) = registry.get(name) else {
            return Err(RuntimeError::new(
                RuntimeErrorKind::UnknownFunction {
                    name: name.to_string(),
                },
                span,
            ));
        };
        let Some(overload) = group.overload(args.len()) else {
            return Err(RuntimeError::new(
                RuntimeErrorKind::WrongArity {
                    name: name.to_string(),
                    arity: args.len(),
                },
                span,
            ));
        };
        let handler = overload.handler;

        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&overload.params) {
            match param.mode {
                ParamMode::Cooked => values.push(ArgValue::Text(self.cook(arg)?)),
                ParamMode::Raw => values.push(ArgValue::Pattern(arg.clone())),
            }
        }

        handler(self, span, &values)
    }

    fn execute_sub_call(
        &mut self,
        span: Span,
        name: &str,
        args: &[Rc<Rst>],
    ) -> Result<(), RuntimeError> {
        let Some((params, body)) = self.subs.get(name).cloned() else {
            return Err(RuntimeError::new(
                RuntimeErrorKind::UnknownSubroutine {
                    name: name.to_string(),
                },
                span,
            ));
        };
        if params.len() != args.len() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::WrongArity {
                    name: name.to_string(),
                    arity: args.len(),
                },
                span,
            ));
        }

        let mut bindings = HashMap::new();
        for (param, arg) in params.iter().zip(args) {
            let value = self.cook(arg)?;
            bindings.insert(param.clone(), RantValue::Text(value));
        }

        self.scopes.push(bindings);
        self.fmt.push(*self.fmt.last().unwrap());
        let result = self.execute(&body);
        self.fmt.pop();
        self.scopes.pop();
        result
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Append text to the active channels, resolving a pending article
    /// placeholder and applying the capitalization filter.
    pub fn print(&mut self, text: &str) -> Result<(), RuntimeError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.article.is_some() {
            if text.trim().is_empty() {
                self.article.as_mut().unwrap().push_str(text);
                return Ok(());
            }
            let buffered = self.article.take().unwrap();
            let article = article_for(text);
            self.emit(article)?;
            self.emit(&buffered)?;
        }
        self.emit(text)
    }

    fn emit(&mut self, text: &str) -> Result<(), RuntimeError> {
        if text.is_empty() {
            return Ok(());
        }
        self.printed += text.len();
        if self.printed > self.limits.max_output {
            return Err(RuntimeError::new(
                RuntimeErrorKind::OutputBudget {
                    limit: self.limits.max_output,
                },
                self.current_span,
            ));
        }

        let mut mode = self.fmt.last().unwrap().capitalization;
        let out = apply_capitalization(text, &mut mode, &mut self.caps_carry);
        self.fmt.last_mut().unwrap().capitalization = mode;
        self.channels.print(&out);
        Ok(())
    }

    /// An article placeholder left unresolved at the end of output falls
    /// back to `a`.
    fn flush_article(&mut self) -> Result<(), RuntimeError> {
        if let Some(buffered) = self.article.take() {
            self.emit("a")?;
            self.emit(&buffered)?;
        }
        Ok(())
    }

    pub fn print_number(&mut self, value: f64) -> Result<(), RuntimeError> {
        let text = format_number(value, self.number_format());
        self.print(&text)
    }

    /// Execute a node into a fresh sub-output and return the text it
    /// produced. Argument text never leaks to the outer channel. The
    /// channel pushed here must still be on top afterwards; a missing one
    /// is a stack underflow.
    pub fn cook(&mut self, rst: &Rst) -> Result<String, RuntimeError> {
        self.channels
            .push("#arg", crate::rst::ChannelVisibility::Private);
        let result = self.execute(rst);
        let captured = self.channels.pop_capture();
        result?;
        captured.ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::StackUnderflow, self.current_span)
        })
    }

    /// Execute an unevaluated (raw) argument in place.
    pub fn run_pattern(&mut self, rst: &Rst) -> Result<(), RuntimeError> {
        self.execute(rst)
    }

    // ------------------------------------------------------------------
    // State accessed by builtin functions
    // ------------------------------------------------------------------

    pub fn rng_mut(&mut self) -> &mut Pcg64 {
        &mut self.rng
    }

    pub fn number_format(&self) -> NumberFormat {
        self.fmt.last().unwrap().number_format
    }

    pub fn set_number_format(&mut self, format: NumberFormat) {
        self.fmt.last_mut().unwrap().number_format = format;
    }

    pub fn set_capitalization(&mut self, mode: Capitalization) {
        self.fmt.last_mut().unwrap().capitalization = mode;
    }

    /// Current (1-based) iteration and total of the innermost block, if one
    /// is executing.
    pub fn block_iteration(&self) -> Option<(usize, usize)> {
        self.blocks.last().map(|f| (f.iteration, f.total))
    }

    pub(crate) fn set_pending_rep(&mut self, count: usize) {
        self.pending.rep = Some(count);
    }

    pub(crate) fn set_pending_sep(&mut self, sep: Rc<Rst>) {
        self.pending.sep = Some(sep);
    }

    pub(crate) fn set_pending_before(&mut self, before: Rc<Rst>) {
        self.pending.before = Some(before);
    }

    pub(crate) fn set_pending_after(&mut self, after: Rc<Rst>) {
        self.pending.after = Some(after);
    }

    pub(crate) fn set_pending_strategy(&mut self, strategy: SelectorStrategy) {
        self.pending.strategy = Some(strategy);
    }

    /// Create or reuse a named synchronizer and arm it for the next block.
    /// An existing synchronizer keeps its state unless an explicit strategy
    /// disagrees with its current one.
    pub(crate) fn arm_sync(&mut self, name: &str, strategy: Option<SelectorStrategy>) {
        let recreate = match (self.syncs.get(name), strategy) {
            (None, _) => true,
            (Some(existing), Some(strategy)) => existing.strategy() != strategy,
            (Some(_), None) => false,
        };
        if recreate {
            let seed = self.rng.gen();
            self.syncs.insert(
                name.to_string(),
                Synchronizer::new(strategy.unwrap_or_default(), seed),
            );
        }
        self.pending.sync = Some(name.to_string());
    }

    pub(crate) fn push_fmt_scope(&mut self) {
        self.fmt.push(*self.fmt.last().unwrap());
    }

    pub(crate) fn pop_fmt_scope(&mut self) {
        if self.fmt.len() > 1 {
            self.fmt.pop();
        }
    }

    pub(crate) fn set_mark(&mut self, name: &str) {
        let top = self.channels.top();
        self.marks
            .insert(name.to_string(), (top.name.clone(), top.len()));
    }

    pub(crate) fn mark_distance(
        &self,
        a: &str,
        b: &str,
        span: Span,
    ) -> Result<usize, RuntimeError> {
        let resolve = |name: &str| -> Result<&(String, usize), RuntimeError> {
            self.marks.get(name).ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::UnknownMark {
                        name: name.to_string(),
                    },
                    span,
                )
            })
        };
        let (chan_a, pos_a) = resolve(a)?;
        let (chan_b, pos_b) = resolve(b)?;
        if chan_a != chan_b {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidArgument {
                    function: "dist".to_string(),
                    message: format!("marks '{}' and '{}' live in different channels", a, b),
                },
                span,
            ));
        }
        Ok(pos_a.abs_diff(*pos_b))
    }

    pub(crate) fn declare_target(&mut self, name: &str) {
        let top = self.channels.top();
        self.holes.push(Hole {
            name: name.to_string(),
            channel: top.name.clone(),
            offset: top.len(),
        });
    }

    pub(crate) fn send_target(
        &mut self,
        name: &str,
        text: String,
        span: Span,
    ) -> Result<(), RuntimeError> {
        if !self.holes.iter().any(|h| h.name == name) {
            return Err(RuntimeError::new(
                RuntimeErrorKind::UnknownTarget {
                    name: name.to_string(),
                },
                span,
            ));
        }
        self.sends.insert(name.to_string(), text);
        Ok(())
    }

    pub(crate) fn push_channel(
        &mut self,
        name: &str,
        visibility: crate::rst::ChannelVisibility,
    ) {
        self.channels.push(name, visibility);
    }

    pub(crate) fn pop_channel(&mut self) {
        self.channels.pop();
    }

    // ------------------------------------------------------------------
    // Variables and arithmetic
    // ------------------------------------------------------------------

    pub fn get_var(&self, name: &str) -> Option<&RantValue> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Update the innermost binding of `name`, or create one in the current
    /// scope.
    pub fn set_var(&mut self, name: &str, value: RantValue) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), value);
    }

    fn eval_arith(&self, expr: &ArithExpr, span: Span) -> Result<f64, RuntimeError> {
        match expr {
            ArithExpr::Number(v) => Ok(*v),
            ArithExpr::Var(name) => match self.get_var(name) {
                Some(RantValue::Num(v)) => Ok(*v),
                Some(RantValue::Text(s)) => s.trim().parse().map_err(|_| {
                    RuntimeError::new(
                        RuntimeErrorKind::InvalidArgument {
                            function: "@".to_string(),
                            message: format!("variable '{}' does not hold a number", name),
                        },
                        span,
                    )
                }),
                Some(RantValue::List(_)) => Err(RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument {
                        function: "@".to_string(),
                        message: format!("variable '{}' is a list", name),
                    },
                    span,
                )),
                None => Err(RuntimeError::new(
                    RuntimeErrorKind::UnknownVariable {
                        name: name.clone(),
                    },
                    span,
                )),
            },
            ArithExpr::Neg(inner) => Ok(-self.eval_arith(inner, span)?),
            ArithExpr::Binary { op, lhs, rhs } => {
                let l = self.eval_arith(lhs, span)?;
                let r = self.eval_arith(rhs, span)?;
                match op {
                    ArithOp::Add => Ok(l + r),
                    ArithOp::Sub => Ok(l - r),
                    ArithOp::Mul => Ok(l * r),
                    ArithOp::Div => {
                        if r == 0.0 {
                            Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, span))
                        } else {
                            Ok(l / r)
                        }
                    }
                    ArithOp::Rem => {
                        if r == 0.0 {
                            Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, span))
                        } else {
                            Ok(l % r)
                        }
                    }
                    ArithOp::Lt => Ok((l < r) as u8 as f64),
                    ArithOp::Le => Ok((l <= r) as u8 as f64),
                    ArithOp::Gt => Ok((l > r) as u8 as f64),
                    ArithOp::Ge => Ok((l >= r) as u8 as f64),
                    ArithOp::Eq => Ok((l == r) as u8 as f64),
                    ArithOp::Ne => Ok((l != r) as u8 as f64),
                }
            }
        }
    }
}

/// Conditional truth: the literal `true`, or any nonzero number.
pub(crate) fn is_truthy(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed == "true" || trimmed.parse::<f64>().map(|v| v != 0.0).unwrap_or(false)
}
