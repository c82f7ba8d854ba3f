//! Builtin functions. Registered explicitly by
//! `FunctionRegistry::with_builtins`; each handler receives the interpreter,
//! the call span, and its prepared arguments.

use rand::Rng;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::format::{Capitalization, NumberFormat};
use crate::interpreter::{is_truthy, Interpreter};
use crate::registry::{ArgValue, FunctionRegistry, Overload, Param};
use crate::rst::ChannelVisibility;
use crate::selector::SelectorStrategy;
use crate::token::Span;

pub fn register_builtins(registry: &mut FunctionRegistry) {
    registry.register(
        "rep",
        vec![Overload {
            params: vec![Param::cooked("count")],
            description: "Sets the iteration count of the next block.",
            handler: rep,
        }],
    );
    registry.register_alias("r", "rep");

    registry.register(
        "sep",
        vec![Overload {
            params: vec![Param::raw("separator")],
            description: "Sets the separator pattern run between iterations of the next block.",
            handler: sep,
        }],
    );
    registry.register_alias("s", "sep");

    registry.register(
        "before",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Sets a pattern run before each iteration of the next block.",
            handler: before,
        }],
    );

    registry.register(
        "after",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Sets a pattern run after each iteration of the next block.",
            handler: after,
        }],
    );

    registry.register(
        "sel",
        vec![Overload {
            params: vec![Param::cooked("strategy")],
            description: "Sets the selection strategy of the next block.",
            handler: sel,
        }],
    );

    registry.register(
        "sync",
        vec![
            Overload {
                params: vec![Param::cooked("name")],
                description: "Binds the next block to a named synchronizer.",
                handler: sync_reuse,
            },
            Overload {
                params: vec![Param::cooked("name"), Param::cooked("strategy")],
                description: "Creates a named synchronizer with a strategy and binds the next block to it.",
                handler: sync_create,
            },
        ],
    );
    registry.register_alias("x", "sync");

    registry.register(
        "repnum",
        vec![Overload {
            params: Vec::new(),
            description: "Prints the current iteration number of the enclosing block.",
            handler: repnum,
        }],
    );
    registry.register_alias("rn", "repnum");

    registry.register(
        "first",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Runs a pattern on the first iteration only.",
            handler: first,
        }],
    );

    registry.register(
        "last",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Runs a pattern on the last iteration only.",
            handler: last,
        }],
    );

    registry.register(
        "even",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Runs a pattern on even-numbered iterations.",
            handler: even,
        }],
    );

    registry.register(
        "odd",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Runs a pattern on odd-numbered iterations.",
            handler: odd,
        }],
    );

    registry.register(
        "notlast",
        vec![Overload {
            params: vec![Param::raw("pattern")],
            description: "Runs a pattern on every iteration except the last.",
            handler: notlast,
        }],
    );

    registry.register(
        "nth",
        vec![
            Overload {
                params: vec![Param::cooked("interval"), Param::raw("pattern")],
                description: "Runs a pattern every nth iteration.",
                handler: nth2,
            },
            Overload {
                params: vec![
                    Param::cooked("interval"),
                    Param::cooked("offset"),
                    Param::raw("pattern"),
                ],
                description: "Runs a pattern every nth iteration, shifted by an offset.",
                handler: nth3,
            },
        ],
    );

    registry.register(
        "mark",
        vec![Overload {
            params: vec![Param::cooked("name")],
            description: "Records the current output position under a name.",
            handler: mark,
        }],
    );

    registry.register(
        "dist",
        vec![Overload {
            params: vec![Param::cooked("a"), Param::cooked("b")],
            description: "Prints the distance between two marks.",
            handler: dist,
        }],
    );

    registry.register(
        "get",
        vec![Overload {
            params: vec![Param::cooked("name")],
            description: "Declares a named target region at the current output position.",
            handler: get_target,
        }],
    );

    registry.register(
        "send",
        vec![Overload {
            params: vec![Param::cooked("name"), Param::cooked("text")],
            description: "Writes text into a previously declared target region.",
            handler: send,
        }],
    );

    registry.register(
        "num",
        vec![Overload {
            params: vec![Param::cooked("min"), Param::cooked("max")],
            description: "Prints a random integer between min and max, inclusive.",
            handler: num,
        }],
    );
    registry.register_alias("n", "num");

    registry.register(
        "numfmt",
        vec![Overload {
            params: vec![Param::cooked("format")],
            description: "Sets the number format for the current scope.",
            handler: numfmt,
        }],
    );

    registry.register(
        "caps",
        vec![Overload {
            params: vec![Param::cooked("mode")],
            description: "Sets the capitalization mode for the current scope.",
            handler: caps,
        }],
    );

    registry.register(
        "chan",
        vec![Overload {
            params: vec![
                Param::cooked("name"),
                Param::cooked("visibility"),
                Param::raw("body"),
            ],
            description: "Runs a pattern inside a named output channel.",
            handler: chan,
        }],
    );

    registry.register(
        "if",
        vec![
            Overload {
                params: vec![Param::cooked("condition"), Param::raw("then")],
                description: "Runs a pattern when the condition is true.",
                handler: if2,
            },
            Overload {
                params: vec![
                    Param::cooked("condition"),
                    Param::raw("then"),
                    Param::raw("else"),
                ],
                description: "Runs one of two patterns depending on the condition.",
                handler: if3,
            },
        ],
    );
}

fn invalid(function: &str, message: impl Into<String>, span: Span) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        },
        span,
    )
}

fn int_arg(function: &str, args: &[ArgValue], index: usize, span: Span) -> Result<i64, RuntimeError> {
    args[index]
        .text()
        .trim()
        .parse()
        .map_err(|_| invalid(function, format!("'{}' is not an integer", args[index].text()), span))
}

/// Run a raw pattern argument when `condition` holds on the current block.
fn run_when(
    interp: &mut Interpreter<'_>,
    args: &[ArgValue],
    index: usize,
    condition: impl Fn(usize, usize) -> bool,
) -> Result<(), RuntimeError> {
    let Some((iteration, total)) = interp.block_iteration() else {
        return Ok(());
    };
    if iteration == 0 || !condition(iteration, total) {
        return Ok(());
    }
    match args[index].pattern() {
        Some(pattern) => interp.run_pattern(&pattern.clone()),
        None => Ok(()),
    }
}

fn rep(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let count = int_arg("rep", args, 0, span)?;
    if count < 0 {
        return Err(invalid("rep", "count must not be negative", span));
    }
    interp.set_pending_rep(count as usize);
    Ok(())
}

fn sep(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    if let Some(pattern) = args[0].pattern() {
        interp.set_pending_sep(pattern.clone());
    }
    Ok(())
}

fn before(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    if let Some(pattern) = args[0].pattern() {
        interp.set_pending_before(pattern.clone());
    }
    Ok(())
}

fn after(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    if let Some(pattern) = args[0].pattern() {
        interp.set_pending_after(pattern.clone());
    }
    Ok(())
}

fn parse_strategy(name: &str, span: Span) -> Result<SelectorStrategy, RuntimeError> {
    SelectorStrategy::from_name(name.trim())
        .ok_or_else(|| invalid("sel", format!("unknown selection strategy '{}'", name.trim()), span))
}

fn sel(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let strategy = parse_strategy(args[0].text(), span)?;
    interp.set_pending_strategy(strategy);
    Ok(())
}

fn sync_reuse(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    interp.arm_sync(args[0].text().trim(), None);
    Ok(())
}

fn sync_create(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let strategy = parse_strategy(args[1].text(), span)?;
    interp.arm_sync(args[0].text().trim(), Some(strategy));
    Ok(())
}

fn repnum(interp: &mut Interpreter<'_>, _span: Span, _args: &[ArgValue]) -> Result<(), RuntimeError> {
    if let Some((iteration, _)) = interp.block_iteration() {
        if iteration > 0 {
            interp.print_number(iteration as f64)?;
        }
    }
    Ok(())
}

fn first(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    run_when(interp, args, 0, |k, _| k == 1)
}

fn last(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    run_when(interp, args, 0, |k, total| k == total)
}

fn even(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    run_when(interp, args, 0, |k, _| k % 2 == 0)
}

fn odd(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    run_when(interp, args, 0, |k, _| k % 2 == 1)
}

fn notlast(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    run_when(interp, args, 0, |k, total| k < total)
}

fn nth2(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    nth_impl(interp, span, args, 0, None, 1)
}

fn nth3(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    nth_impl(interp, span, args, 0, Some(1), 2)
}

fn nth_impl(
    interp: &mut Interpreter<'_>,
    span: Span,
    args: &[ArgValue],
    interval_index: usize,
    offset_index: Option<usize>,
    pattern_index: usize,
) -> Result<(), RuntimeError> {
    let interval = int_arg("nth", args, interval_index, span)?;
    if interval < 1 {
        return Err(invalid("nth", "interval must be at least 1", span));
    }
    let offset = match offset_index {
        Some(i) => int_arg("nth", args, i, span)?.rem_euclid(interval),
        None => 0,
    };
    run_when(interp, args, pattern_index, |k, _| {
        (k as i64 - 1).rem_euclid(interval) == offset
    })
}

fn mark(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    interp.set_mark(args[0].text().trim());
    Ok(())
}

fn dist(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let distance = interp.mark_distance(args[0].text().trim(), args[1].text().trim(), span)?;
    interp.print_number(distance as f64)
}

fn get_target(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    interp.declare_target(args[0].text().trim());
    Ok(())
}

fn send(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let name = args[0].text().trim().to_string();
    let text = args[1].text().to_string();
    interp.send_target(&name, text, span)
}

fn num(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let mut min = int_arg("num", args, 0, span)?;
    let mut max = int_arg("num", args, 1, span)?;
    if min > max {
        std::mem::swap(&mut min, &mut max);
    }
    let value = interp.rng_mut().gen_range(min..=max);
    interp.print_number(value as f64)
}

fn numfmt(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let name = args[0].text().trim().to_string();
    let format = NumberFormat::from_name(&name)
        .ok_or_else(|| invalid("numfmt", format!("unknown number format '{}'", name), span))?;
    interp.set_number_format(format);
    Ok(())
}

fn caps(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let name = args[0].text().trim().to_string();
    let mode = Capitalization::from_name(&name)
        .ok_or_else(|| invalid("caps", format!("unknown capitalization mode '{}'", name), span))?;
    interp.set_capitalization(mode);
    Ok(())
}

fn chan(interp: &mut Interpreter<'_>, span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let name = args[0].text().trim().to_string();
    let visibility = ChannelVisibility::from_name(args[1].text().trim())
        .ok_or_else(|| invalid("chan", format!("unknown visibility '{}'", args[1].text().trim()), span))?;
    let Some(body) = args[2].pattern().cloned() else {
        return Ok(());
    };
    interp.push_channel(&name, visibility);
    interp.push_fmt_scope();
    let result = interp.run_pattern(&body);
    interp.pop_fmt_scope();
    interp.pop_channel();
    result
}

fn if2(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    if is_truthy(args[0].text()) {
        if let Some(pattern) = args[1].pattern() {
            return interp.run_pattern(&pattern.clone());
        }
    }
    Ok(())
}

fn if3(interp: &mut Interpreter<'_>, _span: Span, args: &[ArgValue]) -> Result<(), RuntimeError> {
    let index = if is_truthy(args[0].text()) { 1 } else { 2 };
    if let Some(pattern) = args[index].pattern() {
        return interp.run_pattern(&pattern.clone());
    }
    Ok(())
}
