//! The procedure manager.
//!
//! Each procedure gets one static frame laid out at definition time:
//! parameter cells in positional order, then declared locals and arrays,
//! then the return-address cell.  Recursion is rejected, so frames never
//! coexist with themselves and the allocator simply steps past each
//! finished frame.
//!
//! Parameters are passed by reference: the call site stores the *address*
//! of the caller's variable (for arrays, of its bias cell) into the
//! callee's parameter cell, then the return pc, then jumps to the entry.
//! The callee's epilogue is a single `RTRN` through its return cell.

use crate::back::isa::Instruction::*;
use crate::common::Id;
use crate::front::ast::{CallArg, Procedure};

use super::error::{CodegenError, ErrorKind};
use super::scope::{Binding, Scope};
use super::{stmt, CodeGen, ProcDesc};

pub(super) fn lower_procedure(g: &mut CodeGen, procedure: &Procedure) -> Result<(), CodegenError> {
    if g.procs.contains_key(&procedure.name) {
        return Err(ErrorKind::RedeclaredIdentifier(procedure.name).at(procedure.line));
    }

    let entry = g.here();
    let saved = std::mem::replace(&mut g.scope, Scope::procedure(procedure.name));
    for param in &procedure.params {
        g.scope
            .declare_formal(param.name, param.is_array, &mut g.alloc)
            .map_err(|kind| kind.at(param.line))?;
    }
    g.declare_block(&procedure.body.decls)?;
    let return_cell = g.alloc.reserve_cell();

    // The descriptor is registered before the body so that a self-call
    // resolves and can be reported as recursion.
    g.procs.insert(
        procedure.name,
        ProcDesc {
            entry,
            formals: g.scope.formals().to_vec(),
            return_cell,
        },
    );

    stmt::lower_stmts(g, &procedure.body.stmts)?;
    g.emit(Rtrn(return_cell));

    g.scope = saved;
    g.alloc.finish_frame();
    Ok(())
}

pub(super) fn lower_call(
    g: &mut CodeGen,
    name: Id,
    args: &[CallArg],
    line: u32,
) -> Result<(), CodegenError> {
    if g.scope.name == name {
        return Err(ErrorKind::RecursiveCall(name).at(line));
    }
    let Some(desc) = g.procs.get(&name) else {
        let kind = if g.declared.contains(&name) {
            ErrorKind::ForwardCall(name)
        } else {
            ErrorKind::UnknownProcedure(name)
        };
        return Err(kind.at(line));
    };
    let entry = desc.entry;
    let return_cell = desc.return_cell;
    let formals = desc.formals.clone();

    if args.len() != formals.len() {
        return Err(ErrorKind::ArgCountMismatch {
            name,
            expected: formals.len(),
            got: args.len(),
        }
        .at(line));
    }

    for (arg, formal) in args.iter().zip(&formals) {
        let binding = g.scope.resolve(arg.name).map_err(|kind| kind.at(arg.line))?;
        match (formal.is_array, binding) {
            (false, Binding::Scalar(cell)) => {
                g.emit(Set(cell));
                g.emit(Store(formal.cell));
                // The callee may write through the reference, so the
                // caller's scalar counts as initialized from here on.
                g.scope.mark_initialized(arg.name);
            }
            (false, Binding::Counter(cell)) => {
                g.emit(Set(cell));
                g.emit(Store(formal.cell));
            }
            (false, Binding::ParamScalar(cell)) => {
                g.emit(Load(cell));
                g.emit(Store(formal.cell));
            }
            (true, Binding::Array(info)) => {
                g.emit(Set(info.bias_cell));
                g.emit(Store(formal.cell));
            }
            (true, Binding::ParamArray(cell)) => {
                g.emit(Load(cell));
                g.emit(Store(formal.cell));
            }
            (expects_array, _) => {
                return Err(ErrorKind::ArgKindMismatch {
                    name,
                    argument: arg.name,
                    expects_array,
                }
                .at(arg.line));
            }
        }
    }

    // Return address: the instruction right after the upcoming jump.
    let here = g.here() as i64;
    g.emit(Set(here + 3));
    g.emit(Store(return_cell));
    let offset = g.offset_to(entry);
    g.emit(Jump(offset));
    Ok(())
}
