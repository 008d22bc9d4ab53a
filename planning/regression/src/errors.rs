use thiserror::Error;

use crate::*;

/// Effect constructs that cannot be given a semantics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error("equality effect `{0} == {1}` has no semantics and should have been rejected by the parser")]
    UnsupportedEquals(Term, Term),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectError {
    #[error("duplicate object {0} with types {1} and {2}")]
    DuplicateObjectDeclaration(Sym, Sym, Sym),
}
