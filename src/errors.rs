use std::fmt;

use thiserror::Error;

/// Longest hint text carried along with an error.
pub const HINT_LEN: usize = 127;

/// The closed set of assembler error kinds. Target back-ends report their
/// own conditions through [`ErrorKind::Target`]; the pass driver asks the
/// active back-end to render those codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("user-specified error")]
    User,
    #[error("fatal error")]
    Fatal,
    #[error("out of memory")]
    OutOfMemory,
    #[error("assert failed")]
    AssertFailed,

    #[error("can not create file")]
    FileCreate,
    #[error("can not open file")]
    FileOpen,
    #[error("file format not enabled")]
    NoFormat,
    #[error("maximum number of include files reached")]
    MaxIncludes,

    #[error("comma expected")]
    CommaExpected,
    #[error("value expected")]
    ValueExpected,
    #[error("invalid format specifier")]
    InvalidFormat,
    #[error("error in expression")]
    Expression,
    #[error("incomplete operator")]
    OperatorIncomplete,
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("identifier expected")]
    IdExpected,
    #[error("identifier length exceeded")]
    IdTooLong,
    #[error("statement expected")]
    StatementExpected,
    #[error("illegal statement")]
    IllegalStatement,
    #[error("end of line expected")]
    EolExpected,
    #[error("missing closing brace")]
    MissingCloseBrace,
    #[error("string not terminated")]
    StringUnterminated,
    #[error("character constant not terminated")]
    CharUnterminated,
    #[error("malformed character constant")]
    MalformedChar,
    #[error("string too long")]
    StringTooLong,
    #[error("string expected")]
    StringExpected,

    #[error("division by zero")]
    DivZero,
    #[error("processor type not set")]
    NoCpu,
    #[error("unknown processor type")]
    UnknownCpu,
    #[error("unknown directive")]
    UnknownDirective,
    #[error("unknown instruction")]
    UnknownInstruction,
    #[error("label required")]
    LabelRequired,
    #[error("label not valid here")]
    LabelNotAllowed,
    #[error("illegal redefinition")]
    Redefinition,
    #[error("illegal redefinition of local label")]
    LocalRedefinition,
    #[error("local label requires a global label")]
    LocalNeedsGlobal,
    #[error("symbol already defined as label")]
    LabelAlreadyDefined,
    #[error("undefined value")]
    Undefined,
    #[error("illegal type")]
    IllegalType,
    #[error("value out of range")]
    Range,
    #[error("byte value out of range")]
    RangeByte,
    #[error("word value out of range")]
    RangeWord,

    #[error("IF nesting too deep")]
    IfNestTooDeep,
    #[error("ELSE without IF")]
    ElseWithoutIf,
    #[error("ENDIF without IF")]
    EndifWithoutIf,
    #[error("too many REPEAT levels")]
    RepeatNestTooDeep,
    #[error("ENDREP without REPEAT")]
    EndrepWithoutRepeat,
    #[error("REPEAT without ENDREP")]
    RepeatWithoutEndrep,
    #[error("MACRO before ENDM")]
    MacroNest,
    #[error("ENDM before MACRO")]
    EndmWithoutMacro,
    #[error("not enough actual parameters")]
    MacroActual,
    #[error("not enough formal parameters")]
    MacroFormal,

    /// A back-end specific condition; the code is translated by the
    /// active target's `error_text`.
    #[error("target error {0}")]
    Target(u16),
}

/// An abortable assembly failure: the kind plus an optional hint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    pub kind: ErrorKind,
    pub hint: Option<String>,
}

impl AsmError {
    pub fn new(kind: ErrorKind) -> Self {
        AsmError { kind, hint: None }
    }

    pub fn hint(kind: ErrorKind, hint: impl Into<String>) -> Self {
        let mut h: String = hint.into();
        h.truncate(HINT_LEN);
        AsmError {
            kind,
            hint: Some(h),
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(h) => write!(f, "{} ({})", self.kind, h),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AsmError {}

impl From<ErrorKind> for AsmError {
    fn from(kind: ErrorKind) -> Self {
        AsmError::new(kind)
    }
}

pub type AsmResult<T> = Result<T, AsmError>;

/// The single diagnostic a failed pass surfaces to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}:{line}: error: {message}")]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_hint() {
        let e = AsmError::hint(ErrorKind::FileOpen, "missing.inc");
        assert_eq!(e.to_string(), "can not open file (missing.inc)");
    }

    #[test]
    fn test_hint_is_truncated() {
        let long = "x".repeat(500);
        let e = AsmError::hint(ErrorKind::User, long);
        assert_eq!(e.hint.as_ref().unwrap().len(), HINT_LEN);
    }

    #[test]
    fn test_diagnostic_format() {
        let d = Diagnostic {
            file: "main.asm".to_string(),
            line: 12,
            message: "division by zero".to_string(),
        };
        assert_eq!(d.to_string(), "main.asm:12: error: division by zero");
    }
}
