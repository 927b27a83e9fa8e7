//! Inferred type cells
//!
//! Every operand carries an [`InferredType`]. Cells can be bound so that
//! learning a type in one place (a store into a typed local, a parameter of
//! a resolved method) propagates to related operands. Fixed cells never
//! change again.

use crate::bytecode::JvmType;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

struct TypeCell {
    ty: JvmType,
    fixed: bool,
    listeners: Vec<Weak<RefCell<TypeCell>>>,
}

/// A shared, bindable type slot
#[derive(Clone)]
pub struct InferredType(Rc<RefCell<TypeCell>>);

impl InferredType {
    fn with(ty: JvmType, fixed: bool) -> Self {
        InferredType(Rc::new(RefCell::new(TypeCell {
            ty,
            fixed,
            listeners: Vec::new(),
        })))
    }

    pub fn unknown() -> Self {
        Self::with(JvmType::Unknown, false)
    }

    /// A provisional type that later evidence may replace
    pub fn guess(ty: JvmType) -> Self {
        Self::with(ty, false)
    }

    /// A type that is certain
    pub fn fixed(ty: JvmType) -> Self {
        Self::with(ty, true)
    }

    pub fn get(&self) -> JvmType {
        self.0.borrow().ty.clone()
    }

    pub fn is_fixed(&self) -> bool {
        self.0.borrow().fixed
    }

    pub fn is(&self, ty: &JvmType) -> bool {
        &self.0.borrow().ty == ty
    }

    pub fn same_cell(&self, other: &InferredType) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Fix this cell and every cell listening to it. Already fixed cells keep their type.
    pub fn fix(&self, ty: JvmType) {
        let mut seen = HashSet::new();
        Self::apply(&self.0, &ty, true, &mut seen);
    }

    /// Replace a provisional type; ignored for fixed cells
    pub fn suggest(&self, ty: JvmType) {
        if ty == JvmType::Unknown {
            return;
        }
        let mut seen = HashSet::new();
        Self::apply(&self.0, &ty, false, &mut seen);
    }

    fn apply(cell: &Rc<RefCell<TypeCell>>, ty: &JvmType, fix: bool, seen: &mut HashSet<*const RefCell<TypeCell>>) {
        if !seen.insert(Rc::as_ptr(cell)) {
            return;
        }
        let listeners = {
            let mut inner = cell.borrow_mut();
            if inner.fixed {
                return;
            }
            inner.ty = ty.clone();
            inner.fixed = fix;
            inner.listeners.retain(|weak| weak.strong_count() > 0);
            inner.listeners.clone()
        };
        for listener in listeners.iter().filter_map(Weak::upgrade) {
            Self::apply(&listener, ty, fix, seen);
        }
    }

    /// One-way binding: whatever this cell learns, `target` learns too
    pub fn bind_to(&self, target: &InferredType) {
        if self.same_cell(target) {
            return;
        }
        self.0.borrow_mut().listeners.push(Rc::downgrade(&target.0));
        let (ty, fixed) = {
            let inner = self.0.borrow();
            (inner.ty.clone(), inner.fixed)
        };
        if ty != JvmType::Unknown {
            if fixed {
                target.fix(ty);
            } else {
                target.suggest(ty);
            }
        }
    }

    /// Two-way binding
    pub fn bind_mutually(&self, other: &InferredType) {
        if other.is_fixed() || self.get() == JvmType::Unknown {
            other.bind_to(self);
            self.bind_to(other);
        } else {
            self.bind_to(other);
            other.bind_to(self);
        }
    }
}

impl fmt::Debug for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        write!(f, "{}{}", inner.ty.source_name(), if inner.fixed { "!" } else { "?" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixing_propagates_one_way() {
        let source = InferredType::unknown();
        let target = InferredType::unknown();
        source.bind_to(&target);
        source.fix(JvmType::Boolean);
        assert!(target.is(&JvmType::Boolean));
        assert!(target.is_fixed());

        let other = InferredType::unknown();
        other.bind_to(&InferredType::unknown());
        target.fix(JvmType::Int);
        assert!(target.is(&JvmType::Boolean), "fixed cells never change");
    }

    #[test]
    fn mutual_binding_survives_cycles() {
        let a = InferredType::guess(JvmType::Int);
        let b = InferredType::unknown();
        a.bind_mutually(&b);
        assert!(b.is(&JvmType::Int));
        b.fix(JvmType::Char);
        assert!(a.is(&JvmType::Char));
        assert!(a.is_fixed());
    }
}
