//! The expression lowerer.
//!
//! Every routine here leaves the value of its expression in the
//! accumulator and the memory cursor exactly where it found it.
//! Subexpression results are stashed in allocator temporaries; array
//! operands keep the *address* of the element in the temporary and are
//! combined through the indirect instruction forms.
//!
//! The machine only adds, subtracts and halves, so `*`, `/` and `%` are
//! open-coded: shift-and-add multiplication, long division by doubling the
//! divisor and backing off, and a remainder whose sign follows the
//! divisor.  The three share the sign-normalization helpers.  Division is
//! flooring, so quotient and remainder always satisfy
//! `(a / b) * b + a % b == a`; a divisor of zero skips the routine with a
//! zero accumulator.

use crate::back::isa::Cell;
use crate::back::isa::Instruction::*;
use crate::common::Id;
use crate::front::ast::{BinOp, Expr};

use super::error::{CodegenError, ErrorKind};
use super::scope::Binding;
use super::CodeGen;

pub(super) fn lower_expr(g: &mut CodeGen, expr: &Expr) -> Result<(), CodegenError> {
    match expr {
        Expr::Literal { value, .. } => {
            g.emit(Set(*value));
            Ok(())
        }
        Expr::Name { name, line } => lower_name(g, *name, *line),
        Expr::Element { name, index, line } => {
            let addr = element_address(g, *name, index, *line)?;
            g.emit(LoadI(addr));
            g.alloc.pop_temp();
            Ok(())
        }
        Expr::Binary { op, lhs, rhs, line } => lower_binary(g, *op, lhs, rhs, *line),
    }
}

/// Load a scalar leaf into the accumulator.
fn lower_name(g: &mut CodeGen, name: Id, line: u32) -> Result<(), CodegenError> {
    match g.scope.resolve(name).map_err(|kind| kind.at(line))? {
        Binding::Scalar(cell) => {
            g.scope.check_initialized(name).map_err(|kind| kind.at(line))?;
            g.emit(Load(cell));
        }
        Binding::Counter(cell) => {
            g.emit(Load(cell));
        }
        Binding::ParamScalar(cell) => {
            g.emit(LoadI(cell));
        }
        Binding::Array(_) | Binding::ParamArray(_) => {
            return Err(ErrorKind::MisuseOfArray(name).at(line));
        }
    }
    Ok(())
}

/// Compute the address of `name[index]` into a fresh temporary and return
/// that temporary.  The caller releases it.
pub(super) fn element_address(
    g: &mut CodeGen,
    name: Id,
    index: &Expr,
    line: u32,
) -> Result<Cell, CodegenError> {
    match g.scope.resolve(name).map_err(|kind| kind.at(line))? {
        Binding::Array(info) => {
            lower_expr(g, index)?;
            g.emit(Add(info.bias_cell));
        }
        Binding::ParamArray(cell) => {
            lower_expr(g, index)?;
            g.emit(AddI(cell));
        }
        _ => return Err(ErrorKind::MisuseOfArray(name).at(line)),
    }
    let temp = g.alloc.push_temp();
    g.emit(Store(temp));
    Ok(temp)
}

/// A lowered binary operand: a temporary holding either the value itself
/// or, for array elements, the address of the value.
#[derive(Clone, Copy)]
struct Operand {
    cell: Cell,
    indirect: bool,
}

fn lower_operand(g: &mut CodeGen, expr: &Expr) -> Result<Operand, CodegenError> {
    if let Expr::Element { name, index, line } = expr {
        let cell = element_address(g, *name, index, *line)?;
        return Ok(Operand { cell, indirect: true });
    }
    lower_expr(g, expr)?;
    let cell = g.alloc.push_temp();
    g.emit(Store(cell));
    Ok(Operand { cell, indirect: false })
}

/// Replace an address temporary by the value it points to.  The arithmetic
/// routines clobber their operand cells, so they need plain values.
fn into_value(g: &mut CodeGen, operand: Operand) -> Cell {
    if operand.indirect {
        g.emit(LoadI(operand.cell));
        g.emit(Store(operand.cell));
    }
    operand.cell
}

fn lower_binary(
    g: &mut CodeGen,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    line: u32,
) -> Result<(), CodegenError> {
    if matches!(op, BinOp::Div | BinOp::Mod) {
        if let Expr::Literal { value: 0, .. } = rhs {
            return Err(ErrorKind::DivisionByZero.at(line));
        }
    }

    let a = lower_operand(g, lhs)?;
    let b = lower_operand(g, rhs)?;
    match op {
        BinOp::Add => match (a.indirect, b.indirect) {
            (false, false) => {
                g.emit(Load(a.cell));
                g.emit(Add(b.cell));
            }
            (true, false) => {
                g.emit(LoadI(a.cell));
                g.emit(Add(b.cell));
            }
            (false, true) => {
                g.emit(LoadI(b.cell));
                g.emit(Add(a.cell));
            }
            (true, true) => {
                g.emit(LoadI(a.cell));
                g.emit(AddI(b.cell));
            }
        },
        BinOp::Sub => {
            g.emit(if a.indirect { LoadI(a.cell) } else { Load(a.cell) });
            g.emit(if b.indirect { SubI(b.cell) } else { Sub(b.cell) });
        }
        BinOp::Mul => {
            let a = into_value(g, a);
            let b = into_value(g, b);
            emit_multiply(g, a, b);
        }
        BinOp::Div => {
            let a = into_value(g, a);
            let b = into_value(g, b);
            emit_divide(g, a, b);
        }
        BinOp::Mod => {
            let a = into_value(g, a);
            let b = into_value(g, b);
            emit_modulo(g, a, b);
        }
    }
    g.alloc.pop_temp();
    g.alloc.pop_temp();
    Ok(())
}

/// A temporary preset to a constant.
fn init_temp(g: &mut CodeGen, value: i64) -> Cell {
    let temp = g.alloc.push_temp();
    g.emit(Set(value));
    g.emit(Store(temp));
    temp
}

/// If `M[cell]` is negative, replace it by its absolute value and flip the
/// 0/1 negation flag.
fn normalize_sign(g: &mut CodeGen, cell: Cell, flag: Cell) {
    g.emit(Set(0));
    g.emit(Sub(cell));
    g.emit(Jpos(2));
    let skip = g.emit(Jump(0));
    g.emit(Store(cell));
    g.emit(Set(1));
    g.emit(Sub(flag));
    g.emit(Store(flag));
    g.patch_to_here(skip);
}

/// Leave `M[result]` in the accumulator, negated when the flag is set.
fn apply_sign(g: &mut CodeGen, result: Cell, flag: Cell) {
    g.emit(Load(flag));
    let plain = g.emit(Jzero(0));
    g.emit(Set(0));
    g.emit(Sub(result));
    let done = g.emit(Jump(0));
    g.patch_to_here(plain);
    g.emit(Load(result));
    g.patch_to_here(done);
}

/// Shift-and-add product of `M[a]` and `M[b]`, left in the accumulator.
/// Clobbers both operand cells.
fn emit_multiply(g: &mut CodeGen, a: Cell, b: Cell) {
    let flag = init_temp(g, 0);
    normalize_sign(g, a, flag);
    normalize_sign(g, b, flag);
    let result = init_temp(g, 0);

    let head = g.here();
    g.emit(Load(a));
    let exit = g.emit(Jzero(0));
    // accumulator = 2 * floor(a / 2) - a: zero when a is even
    g.emit(Half);
    g.emit(Add(0));
    g.emit(Sub(a));
    let even = g.emit(Jzero(0));
    g.emit(Load(result));
    g.emit(Add(b));
    g.emit(Store(result));
    g.patch_to_here(even);
    g.emit(Load(a));
    g.emit(Half);
    g.emit(Store(a));
    g.emit(Load(b));
    g.emit(Add(0));
    g.emit(Store(b));
    g.jump_back(head);
    g.patch_to_here(exit);

    apply_sign(g, result, flag);
    g.alloc.pop_temp();
    g.alloc.pop_temp();
}

/// Long division on magnitudes: repeatedly double the divisor until it
/// exceeds the remainder, back off one halving, subtract, and accumulate
/// the quotient bit.  On exit `M[rem]` holds the remainder and `M[quot]`
/// the quotient; `M[div]` is preserved.  Both inputs must be non-negative
/// and `M[div]` non-zero.
fn emit_magnitude_division(g: &mut CodeGen, rem: Cell, div: Cell, quot: Cell) {
    let d = g.alloc.push_temp();
    let q = g.alloc.push_temp();

    let outer = g.here();
    g.emit(Load(div));
    g.emit(Store(d));
    g.emit(Set(1));
    g.emit(Store(q));
    g.emit(Load(rem));
    g.emit(Sub(d));
    let exit = g.emit(Jneg(0));
    let inner = g.here();
    g.emit(Load(d));
    g.emit(Add(0));
    g.emit(Store(d));
    g.emit(Load(q));
    g.emit(Add(0));
    g.emit(Store(q));
    g.emit(Load(rem));
    g.emit(Sub(d));
    let overshoot = g.emit(Jneg(0));
    g.jump_back(inner);
    g.patch_to_here(overshoot);
    g.emit(Load(d));
    g.emit(Half);
    g.emit(Store(d));
    g.emit(Load(q));
    g.emit(Half);
    g.emit(Store(q));
    g.emit(Load(rem));
    g.emit(Sub(d));
    g.emit(Store(rem));
    g.emit(Load(quot));
    g.emit(Add(q));
    g.emit(Store(quot));
    g.jump_back(outer);
    g.patch_to_here(exit);

    g.alloc.pop_temp();
    g.alloc.pop_temp();
}

/// Flooring quotient of `M[a]` by `M[b]`, left in the accumulator.
/// Clobbers both operand cells.  A zero divisor yields zero.
fn emit_divide(g: &mut CodeGen, a: Cell, b: Cell) {
    g.emit(Load(b));
    let zero_divisor = g.emit(Jzero(0));

    let flag = init_temp(g, 0);
    normalize_sign(g, a, flag);
    normalize_sign(g, b, flag);
    let quot = init_temp(g, 0);
    emit_magnitude_division(g, a, b, quot);

    // Flooring: when the signs differ and the division was not exact, the
    // magnitude quotient is one short before negation.
    g.emit(Load(flag));
    let same_sign = g.emit(Jzero(0));
    g.emit(Load(a));
    let exact = g.emit(Jzero(0));
    g.emit(Set(1));
    g.emit(Add(quot));
    g.emit(Store(quot));
    g.patch_to_here(exact);
    g.emit(Set(0));
    g.emit(Sub(quot));
    let done = g.emit(Jump(0));
    g.patch_to_here(same_sign);
    g.emit(Load(quot));
    g.patch_to_here(done);

    g.alloc.pop_temp();
    g.alloc.pop_temp();
    g.patch_to_here(zero_divisor);
}

/// Remainder of `M[a]` by `M[b]` with the sign of the divisor, left in the
/// accumulator.  Clobbers both operand cells.  A zero divisor yields zero.
///
/// The sign flags of dividend and divisor are tracked separately: the
/// remainder correction does not reuse division's combined flag.
fn emit_modulo(g: &mut CodeGen, a: Cell, b: Cell) {
    g.emit(Load(b));
    let zero_divisor = g.emit(Jzero(0));

    let a_neg = init_temp(g, 0);
    let b_neg = init_temp(g, 0);
    normalize_sign(g, a, a_neg);
    normalize_sign(g, b, b_neg);
    let quot = init_temp(g, 0);
    emit_magnitude_division(g, a, b, quot);

    // a now holds the magnitude remainder, b the magnitude divisor.
    g.emit(Load(a));
    let zero_rem = g.emit(Jzero(0));
    g.emit(Load(a_neg));
    let dividend_pos = g.emit(Jzero(0));
    g.emit(Load(b));
    g.emit(Sub(a));
    g.emit(Store(a));
    g.patch_to_here(dividend_pos);
    g.emit(Load(b_neg));
    let divisor_pos = g.emit(Jzero(0));
    g.emit(Load(a));
    g.emit(Sub(b));
    g.emit(Store(a));
    g.patch_to_here(divisor_pos);
    g.emit(Load(a));
    g.patch_to_here(zero_rem);

    g.alloc.pop_temp();
    g.alloc.pop_temp();
    g.alloc.pop_temp();
    g.patch_to_here(zero_divisor);
}
