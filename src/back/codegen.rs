//! The code generator.
//!
//! One pass over the AST that assigns memory cells, checks static
//! semantics and emits instructions, all at once.  [`CodeGen`] owns every
//! piece of mutable state (the instruction buffer, the memory cursor, the
//! active scope, the procedure table); the lowering routines in the
//! submodules receive it as `&mut` and thread errors back with `?`.
//!
//! Forward branches are emitted with a placeholder offset whose index is
//! remembered and overwritten once the end of the block is known; each
//! patch stays local to the statement that created it.

mod error;
mod expr;
mod memory;
mod proc;
mod scope;
mod stmt;

pub use error::{CodegenError, ErrorKind};

use crate::back::isa::{Cell, Instruction};
use crate::common::{id, Id, Map, Set};
use crate::front::ast::{Decl, Program};

use memory::MemoryAllocator;
use scope::{Formal, Scope};

/// Descriptor of an emitted procedure, consulted at every call site.
struct ProcDesc {
    /// Index of the first instruction of the body.
    entry: usize,
    /// Parameter cells in positional order.
    formals: Vec<Formal>,
    /// The last cell of the frame; `RTRN` reads the return pc from it.
    return_cell: Cell,
}

struct CodeGen {
    code: Vec<Instruction>,
    alloc: MemoryAllocator,
    /// The scope lowering currently happens in: main's, or the procedure's
    /// while its body is being emitted.
    scope: Scope,
    procs: Map<Id, ProcDesc>,
    /// Every procedure name in the program, known up front so that a call
    /// to a later procedure is a forward-call error rather than an unknown
    /// name.
    declared: Set<Id>,
}

/// Generate the instruction sequence for a whole program.
pub fn code_gen(program: &Program) -> Result<Vec<Instruction>, CodegenError> {
    let mut g = CodeGen::new();
    g.declared = program.procedures.iter().map(|p| p.name).collect();

    // Procedure bodies come first; a placeholder jump over them is patched
    // to main's entry once it is known.
    let jump_to_main = if program.procedures.is_empty() {
        None
    } else {
        Some(g.emit(Instruction::Jump(0)))
    };
    for procedure in &program.procedures {
        proc::lower_procedure(&mut g, procedure)?;
    }
    g.alloc.finish_frame();
    if let Some(at) = jump_to_main {
        g.patch_to_here(at);
    }

    g.declare_block(&program.main.decls)?;
    stmt::lower_stmts(&mut g, &program.main.stmts)?;
    g.emit(Instruction::Halt);
    Ok(g.code)
}

impl CodeGen {
    fn new() -> Self {
        CodeGen {
            code: Vec::new(),
            alloc: MemoryAllocator::new(),
            scope: Scope::main(id("main")),
            procs: Map::new(),
            declared: Set::new(),
        }
    }

    /// Append an instruction, returning its index.
    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// The index the next instruction will get.
    fn here(&self) -> usize {
        self.code.len()
    }

    /// The relative offset from the next emitted instruction to `target`.
    fn offset_to(&self, target: usize) -> i64 {
        target as i64 - self.here() as i64
    }

    /// Emit an unconditional backward jump to `target`.
    fn jump_back(&mut self, target: usize) {
        let offset = self.offset_to(target);
        self.emit(Instruction::Jump(offset));
    }

    /// Point the placeholder branch at `at` to the next instruction.
    fn patch_to_here(&mut self, at: usize) {
        let offset = (self.code.len() - at) as i64;
        match self.code[at].offset_mut() {
            Some(arg) => *arg = offset,
            None => unreachable!("internal error: patched instruction {at} is not a branch"),
        }
    }

    /// Declare a block's variables in the active scope.  Array declarations
    /// emit the store of the bias value (`base - low`) into the bias cell.
    fn declare_block(&mut self, decls: &[Decl]) -> Result<(), CodegenError> {
        for decl in decls {
            match *decl {
                Decl::Scalar { name, line } => {
                    self.scope
                        .declare_scalar(name, &mut self.alloc)
                        .map_err(|kind| kind.at(line))?;
                }
                Decl::Array { name, low, high, line } => {
                    let info = self
                        .scope
                        .declare_array(name, low, high, &mut self.alloc)
                        .map_err(|kind| kind.at(line))?;
                    self.emit(Instruction::Set(info.base - info.low));
                    self.emit(Instruction::Store(info.bias_cell));
                }
            }
        }
        Ok(())
    }
}
