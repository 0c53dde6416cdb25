//! The statement lowerer.
//!
//! Conditions are lowered as `lhs - rhs` in the accumulator and the branch
//! opcode is chosen per comparison operator.  For `=`, `<` and `>` the
//! condition is only expressible as a branch *into* the then-block, so the
//! else-branch is emitted first; the other three operators get a single
//! skip branch.  All forward branches are placeholders patched once the
//! block extent is known.

use crate::back::isa::Instruction::*;
use crate::common::Id;
use crate::front::ast::{CmpOp, Cond, Expr, Stmt, Target};

use super::error::{CodegenError, ErrorKind};
use super::expr::{element_address, lower_expr};
use super::proc::lower_call;
use super::scope::Binding;
use super::CodeGen;

pub(super) fn lower_stmts(g: &mut CodeGen, stmts: &[Stmt]) -> Result<(), CodegenError> {
    for stmt in stmts {
        lower_stmt(g, stmt)?;
    }
    Ok(())
}

fn lower_stmt(g: &mut CodeGen, stmt: &Stmt) -> Result<(), CodegenError> {
    match stmt {
        Stmt::Assign { target, value, .. } => lower_assign(g, target, value),
        Stmt::Read { target, .. } => lower_read(g, target),
        Stmt::Write { value, .. } => lower_write(g, value),
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => lower_if(g, cond, then_body, else_body),
        Stmt::While { cond, body, .. } => lower_while(g, cond, body),
        Stmt::Repeat { body, cond, .. } => lower_repeat(g, body, cond),
        Stmt::For {
            counter,
            from,
            to,
            downto,
            body,
            line,
        } => lower_for(g, *counter, from, to, *downto, body, *line),
        Stmt::Call { name, args, line } => lower_call(g, *name, args, *line),
    }
}

fn lower_assign(g: &mut CodeGen, target: &Target, value: &Expr) -> Result<(), CodegenError> {
    let line = target.line;
    let binding = g.scope.resolve(target.name).map_err(|kind| kind.at(line))?;
    if let Some(index) = &target.index {
        // The element address is computed before the right-hand side so
        // its lowering cannot clobber the address temporary.
        let addr = element_address(g, target.name, index, line)?;
        lower_expr(g, value)?;
        g.emit(StoreI(addr));
        g.alloc.pop_temp();
        return Ok(());
    }
    match binding {
        Binding::Counter(_) => Err(ErrorKind::AssignToLoopCounter(target.name).at(line)),
        Binding::Scalar(cell) => {
            lower_expr(g, value)?;
            g.emit(Store(cell));
            g.scope.mark_initialized(target.name);
            Ok(())
        }
        Binding::ParamScalar(cell) => {
            lower_expr(g, value)?;
            g.emit(StoreI(cell));
            Ok(())
        }
        Binding::Array(_) | Binding::ParamArray(_) => {
            Err(ErrorKind::MisuseOfArray(target.name).at(line))
        }
    }
}

fn lower_read(g: &mut CodeGen, target: &Target) -> Result<(), CodegenError> {
    let line = target.line;
    let binding = g.scope.resolve(target.name).map_err(|kind| kind.at(line))?;
    if let Some(index) = &target.index {
        let addr = element_address(g, target.name, index, line)?;
        g.emit(Get(0));
        g.emit(StoreI(addr));
        g.alloc.pop_temp();
        return Ok(());
    }
    match binding {
        Binding::Counter(_) => Err(ErrorKind::AssignToLoopCounter(target.name).at(line)),
        Binding::Scalar(cell) => {
            g.emit(Get(cell));
            g.scope.mark_initialized(target.name);
            Ok(())
        }
        Binding::ParamScalar(cell) => {
            g.emit(Get(0));
            g.emit(StoreI(cell));
            Ok(())
        }
        Binding::Array(_) | Binding::ParamArray(_) => {
            Err(ErrorKind::MisuseOfArray(target.name).at(line))
        }
    }
}

fn lower_write(g: &mut CodeGen, value: &Expr) -> Result<(), CodegenError> {
    // Directly addressable scalars are printed straight from their cell;
    // everything else goes through the accumulator.
    if let Expr::Name { name, line } = value {
        match g.scope.resolve(*name).map_err(|kind| kind.at(*line))? {
            Binding::Scalar(cell) => {
                g.scope
                    .check_initialized(*name)
                    .map_err(|kind| kind.at(*line))?;
                g.emit(Put(cell));
                return Ok(());
            }
            Binding::Counter(cell) => {
                g.emit(Put(cell));
                return Ok(());
            }
            _ => {}
        }
    }
    lower_expr(g, value)?;
    g.emit(Put(0));
    Ok(())
}

/// Leave `lhs - rhs` in the accumulator.
fn lower_condition(g: &mut CodeGen, cond: &Cond) -> Result<(), CodegenError> {
    lower_expr(g, &cond.rhs)?;
    let temp = g.alloc.push_temp();
    g.emit(Store(temp));
    lower_expr(g, &cond.lhs)?;
    g.emit(Sub(temp));
    g.alloc.pop_temp();
    Ok(())
}

fn lower_if(
    g: &mut CodeGen,
    cond: &Cond,
    then_body: &[Stmt],
    else_body: &[Stmt],
) -> Result<(), CodegenError> {
    lower_condition(g, cond)?;
    match cond.op {
        // One branch skips the then-block when the condition fails.
        CmpOp::Ne | CmpOp::Le | CmpOp::Ge => {
            let skip = g.emit(match cond.op {
                CmpOp::Ne => Jzero(0),
                CmpOp::Le => Jpos(0),
                _ => Jneg(0),
            });
            lower_stmts(g, then_body)?;
            if else_body.is_empty() {
                g.patch_to_here(skip);
            } else {
                let over_else = g.emit(Jump(0));
                g.patch_to_here(skip);
                lower_stmts(g, else_body)?;
                g.patch_to_here(over_else);
            }
        }
        // One branch jumps into the then-block, so the else-branch comes
        // first.
        CmpOp::Eq | CmpOp::Lt | CmpOp::Gt => {
            let to_then = g.emit(match cond.op {
                CmpOp::Eq => Jzero(0),
                CmpOp::Lt => Jneg(0),
                _ => Jpos(0),
            });
            lower_stmts(g, else_body)?;
            let over_then = g.emit(Jump(0));
            g.patch_to_here(to_then);
            lower_stmts(g, then_body)?;
            g.patch_to_here(over_then);
        }
    }
    Ok(())
}

fn lower_while(g: &mut CodeGen, cond: &Cond, body: &[Stmt]) -> Result<(), CodegenError> {
    let head = g.here();
    lower_condition(g, cond)?;
    let exit = match cond.op {
        CmpOp::Ne => g.emit(Jzero(0)),
        CmpOp::Le => g.emit(Jpos(0)),
        CmpOp::Ge => g.emit(Jneg(0)),
        CmpOp::Eq => {
            g.emit(Jzero(2));
            g.emit(Jump(0))
        }
        CmpOp::Lt => {
            g.emit(Jneg(2));
            g.emit(Jump(0))
        }
        CmpOp::Gt => {
            g.emit(Jpos(2));
            g.emit(Jump(0))
        }
    };
    lower_stmts(g, body)?;
    g.jump_back(head);
    g.patch_to_here(exit);
    Ok(())
}

fn lower_repeat(g: &mut CodeGen, body: &[Stmt], cond: &Cond) -> Result<(), CodegenError> {
    let head = g.here();
    lower_stmts(g, body)?;
    lower_condition(g, cond)?;
    // Loop again exactly when the condition does not hold yet.
    match cond.op {
        CmpOp::Ne => {
            let offset = g.offset_to(head);
            g.emit(Jzero(offset));
        }
        CmpOp::Le => {
            let offset = g.offset_to(head);
            g.emit(Jpos(offset));
        }
        CmpOp::Ge => {
            let offset = g.offset_to(head);
            g.emit(Jneg(offset));
        }
        CmpOp::Eq => {
            g.emit(Jzero(2));
            g.jump_back(head);
        }
        CmpOp::Lt => {
            g.emit(Jneg(2));
            g.jump_back(head);
        }
        CmpOp::Gt => {
            g.emit(Jpos(2));
            g.jump_back(head);
        }
    }
    Ok(())
}

fn lower_for(
    g: &mut CodeGen,
    counter: Id,
    from: &Expr,
    to: &Expr,
    downto: bool,
    body: &[Stmt],
    line: u32,
) -> Result<(), CodegenError> {
    let cell = g.alloc.push_temp();
    g.scope
        .add_counter(counter, cell)
        .map_err(|kind| kind.at(line))?;
    lower_expr(g, from)?;
    g.emit(Store(cell));
    // The bound is evaluated once, before the first iteration.
    lower_expr(g, to)?;
    let bound = g.alloc.push_temp();
    g.emit(Store(bound));

    let head = g.here();
    g.emit(Load(cell));
    g.emit(Sub(bound));
    let exit = g.emit(if downto { Jneg(0) } else { Jpos(0) });
    lower_stmts(g, body)?;
    g.emit(Set(if downto { -1 } else { 1 }));
    g.emit(Add(cell));
    g.emit(Store(cell));
    g.jump_back(head);
    g.patch_to_here(exit);

    g.scope.remove_counter(counter);
    g.alloc.pop_temp();
    g.alloc.pop_temp();
    Ok(())
}
