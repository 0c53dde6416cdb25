//! The symbol resolver.
//!
//! One scope for main, one per procedure.  A scope maps names to bindings
//! (kind plus address), keeps the ordered formal-parameter list, the loop
//! counters currently in flight, and the set of scalars that have been
//! written since scope entry.
//!
//! Lookup order inside a procedure is formals (scalar then array), then
//! locals, then counters.  In main the counters come first: a `for` counter
//! shadows a same-named global for the duration of the loop.

use crate::back::isa::Cell;
use crate::common::{Id, Map, Set};

use super::error::ErrorKind;
use super::memory::MemoryAllocator;

/// Everything the generator needs to know about a declared array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfo {
    pub base: Cell,
    pub bias_cell: Cell,
    pub low: i64,
    pub high: i64,
}

/// A formal parameter slot.  The cell holds an address, not a value.
#[derive(Clone, Copy, Debug)]
pub struct Formal {
    pub name: Id,
    pub cell: Cell,
    pub is_array: bool,
}

/// What a name resolves to in the active scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// A global or procedure-local scalar; the cell holds its value.
    Scalar(Cell),
    /// A global or procedure-local array.
    Array(ArrayInfo),
    /// A scalar formal; the cell holds the address of the caller's scalar.
    ParamScalar(Cell),
    /// An array formal; the cell holds the address of the caller's bias cell.
    ParamArray(Cell),
    /// An active `for` counter; the cell holds its value.
    Counter(Cell),
}

pub struct Scope {
    pub name: Id,
    is_main: bool,
    formals: Vec<Formal>,
    scalars: Map<Id, Cell>,
    arrays: Map<Id, ArrayInfo>,
    counters: Map<Id, Cell>,
    initialized: Set<Id>,
}

impl Scope {
    pub fn main(name: Id) -> Self {
        Scope {
            name,
            is_main: true,
            formals: Vec::new(),
            scalars: Map::new(),
            arrays: Map::new(),
            counters: Map::new(),
            initialized: Set::new(),
        }
    }

    pub fn procedure(name: Id) -> Self {
        Scope {
            is_main: false,
            ..Scope::main(name)
        }
    }

    pub fn formals(&self) -> &[Formal] {
        &self.formals
    }

    fn taken(&self, name: Id) -> bool {
        self.formals.iter().any(|f| f.name == name)
            || self.scalars.contains_key(&name)
            || self.arrays.contains_key(&name)
    }

    /// Reserve the parameter cell for the next formal.  Formals count as
    /// initialized on entry.
    pub fn declare_formal(
        &mut self,
        name: Id,
        is_array: bool,
        alloc: &mut MemoryAllocator,
    ) -> Result<Cell, ErrorKind> {
        if self.taken(name) {
            return Err(ErrorKind::RedeclaredIdentifier(name));
        }
        let cell = alloc.reserve_cell();
        self.formals.push(Formal { name, cell, is_array });
        self.initialized.insert(name);
        Ok(cell)
    }

    pub fn declare_scalar(
        &mut self,
        name: Id,
        alloc: &mut MemoryAllocator,
    ) -> Result<Cell, ErrorKind> {
        if self.taken(name) {
            return Err(ErrorKind::RedeclaredIdentifier(name));
        }
        let cell = alloc.reserve_cell();
        self.scalars.insert(name, cell);
        Ok(cell)
    }

    pub fn declare_array(
        &mut self,
        name: Id,
        low: i64,
        high: i64,
        alloc: &mut MemoryAllocator,
    ) -> Result<ArrayInfo, ErrorKind> {
        if self.taken(name) {
            return Err(ErrorKind::RedeclaredIdentifier(name));
        }
        if low > high {
            return Err(ErrorKind::InvalidArrayRange { name, low, high });
        }
        let cells = alloc.reserve_array(high - low + 1);
        let info = ArrayInfo {
            base: cells.base,
            bias_cell: cells.bias_cell,
            low,
            high,
        };
        self.arrays.insert(name, info);
        Ok(info)
    }

    /// Bring a `for` counter into flight.  Counters may shadow declared
    /// names but not each other.
    pub fn add_counter(&mut self, name: Id, cell: Cell) -> Result<(), ErrorKind> {
        if self.counters.contains_key(&name) {
            return Err(ErrorKind::RedeclaredIdentifier(name));
        }
        self.counters.insert(name, cell);
        Ok(())
    }

    pub fn remove_counter(&mut self, name: Id) {
        self.counters.remove(&name);
    }

    pub fn resolve(&self, name: Id) -> Result<Binding, ErrorKind> {
        if self.is_main {
            if let Some(&cell) = self.counters.get(&name) {
                return Ok(Binding::Counter(cell));
            }
        } else {
            for formal in self.formals.iter().filter(|f| !f.is_array) {
                if formal.name == name {
                    return Ok(Binding::ParamScalar(formal.cell));
                }
            }
            for formal in self.formals.iter().filter(|f| f.is_array) {
                if formal.name == name {
                    return Ok(Binding::ParamArray(formal.cell));
                }
            }
        }
        if let Some(&cell) = self.scalars.get(&name) {
            return Ok(Binding::Scalar(cell));
        }
        if let Some(&info) = self.arrays.get(&name) {
            return Ok(Binding::Array(info));
        }
        if !self.is_main {
            if let Some(&cell) = self.counters.get(&name) {
                return Ok(Binding::Counter(cell));
            }
        }
        Err(ErrorKind::UndeclaredIdentifier(name))
    }

    pub fn mark_initialized(&mut self, name: Id) {
        self.initialized.insert(name);
    }

    /// Guard a read of a scalar cell.  Only plain scalars are tracked:
    /// formals and counters are initialized by construction, and array
    /// elements are exempt.
    pub fn check_initialized(&self, name: Id) -> Result<(), ErrorKind> {
        if self.initialized.contains(&name) {
            Ok(())
        } else {
            Err(ErrorKind::UseBeforeInit(name))
        }
    }
}
