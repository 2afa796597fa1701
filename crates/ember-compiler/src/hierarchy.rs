//! Class hierarchy and typeid assignment
//!
//! Typeids are assigned by a pre-order walk of the `extends` tree, so every
//! class owns the contiguous range `[id, id + |subtree| - 1]` covering itself
//! and all of its extends-descendants. `implements` edges take part in
//! dispatch and instanceof but not in numbering.

use crate::error::{CompileError, CompileResult};
use crate::ir::{ClassId, Program};
use serde::Serialize;

/// Inclusive range of typeids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeIdRange {
    pub start: u32,
    pub end: u32,
}

impl TypeIdRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Single-typeid range
    pub fn point(id: u32) -> Self {
        Self::new(id, id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.start <= id && id <= self.end
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}

impl std::fmt::Display for TypeIdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Typeid assignment for every class of a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeIdTable {
    ranges: Vec<TypeIdRange>,
    by_typeid: Vec<ClassId>,
}

impl TypeIdTable {
    /// Range of a class (its own typeid is `range.start`)
    pub fn range(&self, class: ClassId) -> TypeIdRange {
        self.ranges[class.index()]
    }

    /// Own typeid of a class
    pub fn typeid(&self, class: ClassId) -> u32 {
        self.ranges[class.index()].start
    }

    /// Class whose own typeid is `typeid`
    pub fn class_at(&self, typeid: u32) -> Option<ClassId> {
        self.by_typeid.get(typeid as usize).copied()
    }

    /// Number of typeids (equals the number of classes)
    pub fn len(&self) -> usize {
        self.by_typeid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_typeid.is_empty()
    }
}

/// Number every class by a pre-order walk of the extends tree.
///
/// Roots are visited in declaration order, children likewise.
pub fn assign_type_ids(program: &Program) -> CompileResult<TypeIdTable> {
    let hierarchy = Hierarchy::new(program)?;
    let n = program.classes.len();
    let mut ranges = vec![TypeIdRange::point(0); n];
    let mut by_typeid = Vec::with_capacity(n);

    // (class, children visited yet)
    let mut stack: Vec<(ClassId, bool)> = hierarchy
        .roots()
        .into_iter()
        .rev()
        .map(|c| (c, false))
        .collect();
    while let Some((class, done)) = stack.pop() {
        if done {
            ranges[class.index()].end = by_typeid.len() as u32 - 1;
            continue;
        }
        ranges[class.index()].start = by_typeid.len() as u32;
        by_typeid.push(class);
        stack.push((class, true));
        for child in hierarchy.extends_children(class).iter().rev() {
            stack.push((*child, false));
        }
    }

    log::debug!("assigned {} typeids", by_typeid.len());
    Ok(TypeIdTable { ranges, by_typeid })
}

/// Navigation over the combined superclass relation
#[derive(Debug)]
pub struct Hierarchy<'p> {
    program: &'p Program,
    extends_children: Vec<Vec<ClassId>>,
    direct_subs: Vec<Vec<ClassId>>,
}

impl<'p> Hierarchy<'p> {
    /// Build the hierarchy, rejecting unknown superclasses and cycles
    pub fn new(program: &'p Program) -> CompileResult<Self> {
        let n = program.classes.len();
        let mut extends_children = vec![Vec::new(); n];
        let mut direct_subs = vec![Vec::new(); n];

        for (i, class) in program.classes.iter().enumerate() {
            let id = ClassId::new(i as u32);
            for sup in class.supers() {
                if sup.index() >= n {
                    return Err(CompileError::structural(
                        format!("class {} has unknown superclass {}", class.name, sup),
                        &class.span,
                    ));
                }
                if !direct_subs[sup.index()].contains(&id) {
                    direct_subs[sup.index()].push(id);
                }
            }
            if let Some(sup) = class.extends {
                extends_children[sup.index()].push(id);
            }
        }

        let hierarchy = Self {
            program,
            extends_children,
            direct_subs,
        };
        hierarchy.check_acyclic()?;
        Ok(hierarchy)
    }

    fn check_acyclic(&self) -> CompileResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let n = self.program.classes.len();
        let mut marks = vec![Mark::New; n];

        for start in 0..n {
            if marks[start] != Mark::New {
                continue;
            }
            // (class, next super index)
            let mut stack = vec![(ClassId::new(start as u32), 0usize)];
            marks[start] = Mark::Active;
            while let Some((class, next)) = stack.pop() {
                let supers = self.supers(class);
                if next == supers.len() {
                    marks[class.index()] = Mark::Done;
                    continue;
                }
                stack.push((class, next + 1));
                let sup = supers[next];
                match marks[sup.index()] {
                    Mark::Active => {
                        let c = self.program.class(sup);
                        return Err(CompileError::structural(
                            format!("cyclic class hierarchy through {}", c.name),
                            &c.span,
                        ));
                    }
                    Mark::New => {
                        marks[sup.index()] = Mark::Active;
                        stack.push((sup, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    /// Classes without an extends superclass, in declaration order
    pub fn roots(&self) -> Vec<ClassId> {
        self.program
            .classes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.extends.is_none())
            .map(|(i, _)| ClassId::new(i as u32))
            .collect()
    }

    /// Direct extends-children in declaration order
    pub fn extends_children(&self, class: ClassId) -> &[ClassId] {
        &self.extends_children[class.index()]
    }

    /// Direct superclasses: extends first, then implements
    pub fn supers(&self, class: ClassId) -> Vec<ClassId> {
        self.program.class(class).supers().collect()
    }

    /// Reflexive-transitive subclasses over the combined relation, in
    /// declaration order
    pub fn subclasses(&self, class: ClassId) -> Vec<ClassId> {
        let mut seen = vec![false; self.program.classes.len()];
        let mut stack = vec![class];
        seen[class.index()] = true;
        while let Some(c) = stack.pop() {
            for sub in &self.direct_subs[c.index()] {
                if !seen[sub.index()] {
                    seen[sub.index()] = true;
                    stack.push(*sub);
                }
            }
        }
        seen.iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| ClassId::new(i as u32))
            .collect()
    }

    /// Whether `sub` is `sup` or one of its subclasses
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup {
            return true;
        }
        self.supers(sub).into_iter().any(|s| self.is_subclass(s, sup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ProgramBuilder;

    /// A(B(D), C) and E, with C also implementing E
    fn sample() -> (Program, Vec<ClassId>) {
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        let b = pb.class("B");
        let c = pb.class("C");
        let d = pb.class("D");
        let e = pb.class("E");
        pb.extends(b, a);
        pb.extends(c, a);
        pb.extends(d, b);
        pb.implements(c, e);
        (pb.finish(), vec![a, b, c, d, e])
    }

    #[test]
    fn test_preorder_ranges() {
        let (program, ids) = sample();
        let table = assign_type_ids(&program).unwrap();
        let (a, b, c, d, e) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
        assert_eq!(table.range(a), TypeIdRange::new(0, 3));
        assert_eq!(table.range(b), TypeIdRange::new(1, 2));
        assert_eq!(table.range(d), TypeIdRange::point(2));
        assert_eq!(table.range(c), TypeIdRange::point(3));
        assert_eq!(table.range(e), TypeIdRange::point(4));
        assert_eq!(table.class_at(2), Some(d));
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_subclasses_follow_implements() {
        let (program, ids) = sample();
        let hierarchy = Hierarchy::new(&program).unwrap();
        assert_eq!(hierarchy.subclasses(ids[4]), vec![ids[2], ids[4]]);
        assert_eq!(hierarchy.subclasses(ids[1]), vec![ids[1], ids[3]]);
        assert!(hierarchy.is_subclass(ids[3], ids[0]));
        assert!(hierarchy.is_subclass(ids[2], ids[4]));
        assert!(!hierarchy.is_subclass(ids[0], ids[2]));
    }

    #[test]
    fn test_cycle_is_structural_error() {
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        let b = pb.class("B");
        let c = pb.class("C");
        pb.extends(b, a);
        pb.implements(c, b);
        pb.implements(a, c);
        let program = pb.finish();
        let err = assign_type_ids(&program).unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn test_unknown_superclass_rejected() {
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        pb.extends(a, ClassId(9));
        let program = pb.finish();
        assert!(Hierarchy::new(&program).is_err());
    }
}
