use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::ops::{Deref, DerefMut};

use itertools::Itertools;
use smallvec::SmallVec;

use crate::{Term, Var};

type Frame = SmallVec<[(Var, Term); 4]>;

/// Mapping from variables to terms.
///
/// A substitution is made of a base layer, and of a stack of local frames that shadow it.
/// Local frames are used to temporarily bind quantified variables (e.g. when expanding a `forall` effect)
/// and must be released in the reverse order of their creation.
/// The [`Substitution::scope`] method returns a guard that releases the frame when dropped, on every exit path.
#[derive(Clone, Default)]
pub struct Substitution {
    base: im::OrdMap<Var, Term>,
    frames: Vec<Frame>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings(bindings: impl IntoIterator<Item = (Var, Term)>) -> Self {
        Substitution {
            base: bindings.into_iter().collect(),
            frames: Vec::new(),
        }
    }

    /// Binds `var` in the base layer, returning the previous binding if any.
    pub fn bind(&mut self, var: Var, value: Term) -> Option<Term> {
        self.base.insert(var, value)
    }

    /// Returns the term bound to `var`, looking into local frames first (innermost first).
    pub fn get(&self, var: Var) -> Option<&Term> {
        for frame in self.frames.iter().rev() {
            if let Some((_, t)) = frame.iter().rev().find(|(v, _)| *v == var) {
                return Some(t);
            }
        }
        self.base.get(&var)
    }

    pub fn contains(&self, var: Var) -> bool {
        self.get(var).is_some()
    }

    /// True if no variable is bound, in which case grounding is the identity.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.frames.iter().all(|f| f.is_empty())
    }

    /// Number of local frames currently pushed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, bindings: impl IntoIterator<Item = (Var, Term)>) {
        self.frames.push(bindings.into_iter().collect());
    }

    pub fn pop(&mut self) {
        let popped = self.frames.pop();
        debug_assert!(popped.is_some(), "Unbalanced substitution scope");
    }

    /// Pushes a local frame with the given bindings, which is popped when the returned guard is dropped.
    pub fn scope(&mut self, bindings: impl IntoIterator<Item = (Var, Term)>) -> Scope<'_> {
        let depth = self.depth();
        self.push(bindings);
        Scope { sub: self, depth }
    }

    /// All visible bindings, ordered by variable.
    pub fn bindings(&self) -> BTreeMap<Var, &Term> {
        let mut visible: BTreeMap<Var, &Term> = self.base.iter().map(|(v, t)| (*v, t)).collect();
        for frame in &self.frames {
            for (v, t) in frame {
                visible.insert(*v, t);
            }
        }
        visible
    }

    /// Owned copy of all visible bindings.
    pub fn to_bindings(&self) -> Vec<(Var, Term)> {
        self.bindings().into_iter().map(|(v, t)| (v, t.clone())).collect()
    }

    /// Returns a substitution with all visible bindings in its base layer and no local frame.
    pub fn flattened(&self) -> Substitution {
        Substitution::from_bindings(self.to_bindings())
    }

    /// Adds all bindings of `other` to the base layer.
    /// Returns false if `other` binds a variable to a term that differs from the current binding,
    /// in which case the current binding is kept.
    pub fn union(&mut self, other: &Substitution) -> bool {
        let mut compatible = true;
        for (var, term) in other.bindings() {
            match self.get(var) {
                Some(previous) if previous != term => compatible = false,
                Some(_) => {}
                None => {
                    self.bind(var, term.clone());
                }
            }
        }
        compatible
    }

    /// Restricts the substitution to the variables accepted by `keep`.
    pub fn restricted(&self, keep: impl Fn(Var) -> bool) -> Substitution {
        Substitution::from_bindings(
            self.bindings()
                .into_iter()
                .filter(|(v, _)| keep(*v))
                .map(|(v, t)| (v, t.clone())),
        )
    }
}

impl PartialEq for Substitution {
    fn eq(&self, other: &Self) -> bool {
        self.bindings() == other.bindings()
    }
}

impl Eq for Substitution {}

impl Display for Substitution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.bindings().iter().map(|(v, t)| format!("{v} -> {t}")).format(", ")
        )
    }
}

impl Debug for Substitution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// A local frame of a substitution, popped on drop.
pub struct Scope<'a> {
    sub: &'a mut Substitution,
    depth: usize,
}

impl Deref for Scope<'_> {
    type Target = Substitution;

    fn deref(&self) -> &Self::Target {
        &*self.sub
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.sub
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        // frames pushed manually inside the scope are released as well
        self.sub.frames.truncate(self.depth);
    }
}
