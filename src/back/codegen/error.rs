//! Code generation errors.
//!
//! Every failure is fatal: the generator stops at the first one and the
//! caller discards any partial output.  The message format is
//! `Error at line N: <text>`.

use derive_more::Display;

use crate::common::Id;

#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
    #[display("redeclared identifier: {_0}")]
    RedeclaredIdentifier(Id),
    #[display("undeclared identifier: {_0}")]
    UndeclaredIdentifier(Id),
    #[display("invalid array range for {name}: {low}:{high}")]
    InvalidArrayRange { name: Id, low: i64, high: i64 },
    #[display("misuse of array variable: {_0}")]
    MisuseOfArray(Id),
    #[display("variable used before initialization: {_0}")]
    UseBeforeInit(Id),
    #[display("cannot assign to loop counter: {_0}")]
    AssignToLoopCounter(Id),
    #[display("wrong number of arguments for {name}: expected {expected}, got {got}")]
    ArgCountMismatch { name: Id, expected: usize, got: usize },
    #[display("argument {argument} of {name} should be {}", if *expects_array { "an array" } else { "a scalar" })]
    ArgKindMismatch {
        name: Id,
        argument: Id,
        expects_array: bool,
    },
    #[display("unknown procedure: {_0}")]
    UnknownProcedure(Id),
    #[display("call to procedure {_0} before its definition")]
    ForwardCall(Id),
    #[display("recursive call to procedure {_0}")]
    RecursiveCall(Id),
    #[display("division by zero")]
    DivisionByZero,
}

impl ErrorKind {
    /// Attach the source line the offending construct came from.
    pub fn at(self, line: u32) -> CodegenError {
        CodegenError { kind: self, line }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CodegenError {
    pub kind: ErrorKind,
    pub line: u32,
}

impl std::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error at line {}: {}", self.line, self.kind)
    }
}

impl std::fmt::Debug for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;

    #[test]
    fn messages_are_line_tagged() {
        let err = ErrorKind::UndeclaredIdentifier(id("x")).at(12);
        assert_eq!(err.to_string(), "Error at line 12: undeclared identifier: x");

        let err = ErrorKind::ArgKindMismatch {
            name: id("fill"),
            argument: id("A"),
            expects_array: true,
        }
        .at(3);
        assert_eq!(
            err.to_string(),
            "Error at line 3: argument A of fill should be an array"
        );
    }
}
