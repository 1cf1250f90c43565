//! Iteration domains and domain transformations.
//!
//! A [`Domain`] is a symbolic integer polytope: ordered variables, a
//! condition set whose conjunction carves the domain out of the box given
//! by `ranges`, and the ranges themselves (which may also cover enclosing
//! variables the conditions refer to).
//!
//! A [`DomainTransformation`] relates two domains through a pair of sound
//! substitution maps. Transformations compose associatively; the identity
//! transformation is the unit and the empty transformation absorbs on
//! matching boundaries.

use std::fmt;

use rustc_hash::FxHashMap;
use zeroxide_ir::expr::{ExprId, ExprManager, RangeMap};
use zeroxide_ir::simplify::simplify;
use zeroxide_ir::subst::substitute;

use crate::error::{Error, Result};
use crate::util::sorted_ranges;

/// Symbolic integer iteration domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    /// Domain variables, in iteration order.
    pub variables: Vec<ExprId>,
    /// Boolean conditions; their conjunction defines the domain.
    pub conditions: Vec<ExprId>,
    /// Ranges of the domain variables and of any outer variables the
    /// conditions mention.
    pub ranges: RangeMap,
}

impl Domain {
    /// Create a domain.
    pub fn new(variables: Vec<ExprId>, conditions: Vec<ExprId>, ranges: RangeMap) -> Self {
        Domain {
            variables,
            conditions,
            ranges,
        }
    }

    /// Printable view of the domain; needs the manager the expressions
    /// live in.
    pub fn display<'a>(&'a self, tm: &'a ExprManager) -> DisplayDomain<'a> {
        DisplayDomain { tm, domain: self }
    }
}

/// `Display` adapter returned by [`Domain::display`].
pub struct DisplayDomain<'a> {
    tm: &'a ExprManager,
    domain: &'a Domain,
}

impl fmt::Display for DisplayDomain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tm, domain) = (self.tm, self.domain);
        write!(f, "Domain(box_volume=")?;
        // The volume of the bounding box is the product of the variable
        // extents; a variable without a range makes it unbounded.
        if domain
            .variables
            .iter()
            .any(|v| !domain.ranges.contains_key(v))
        {
            write!(f, "inf")?;
        } else {
            let mut volume: Option<i64> = Some(1);
            for v in &domain.variables {
                let extent = tm.as_const_int(domain.ranges[v].extent);
                volume = volume.zip(extent).and_then(|(p, e)| p.checked_mul(e));
            }
            match volume {
                Some(v) => write!(f, "{v}")?,
                None => {
                    // Symbolic extents: print the product unexpanded.
                    for (i, v) in domain.variables.iter().enumerate() {
                        if i > 0 {
                            write!(f, "*")?;
                        }
                        write!(f, "{}", tm.display(domain.ranges[v].extent))?;
                    }
                }
            }
        }
        write!(f, ", variables=[")?;
        for (i, &v) in domain.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", tm.display(v))?;
        }
        write!(f, "], conditions=[")?;
        for (i, &c) in domain.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", tm.display(c))?;
        }
        write!(f, "], ranges={{")?;
        for (i, (v, r)) in sorted_ranges(tm, &domain.ranges).into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", tm.display(v), tm.display_range(r))?;
        }
        write!(f, "}})")
    }
}

/// A change of variables between two domains.
///
/// `new_to_old` expresses each new variable over the old ones and
/// `old_to_new` the reverse; substituting either map into conditions
/// satisfied on one side yields conditions satisfied on the other.
#[derive(Debug, Clone)]
pub struct DomainTransformation {
    /// The resulting domain.
    pub new_domain: Domain,
    /// The domain that was transformed.
    pub old_domain: Domain,
    /// Map from new variables to expressions over old variables.
    pub new_to_old: FxHashMap<ExprId, ExprId>,
    /// Map from old variables to expressions over new variables.
    pub old_to_new: FxHashMap<ExprId, ExprId>,
}

/// The identity transformation on `domain`.
pub fn id_transformation(domain: &Domain) -> DomainTransformation {
    let map: FxHashMap<ExprId, ExprId> = domain.variables.iter().map(|&v| (v, v)).collect();
    DomainTransformation {
        new_domain: domain.clone(),
        old_domain: domain.clone(),
        new_to_old: map.clone(),
        old_to_new: map,
    }
}

/// The transformation onto a provably empty domain: no variables, a single
/// `false` condition, and every old variable collapsed to zero.
pub fn empty_transformation(tm: &mut ExprManager, domain: &Domain) -> DomainTransformation {
    let mut old_to_new = FxHashMap::default();
    for &v in &domain.variables {
        let zero = tm.mk_zero(tm.dtype(v));
        old_to_new.insert(v, zero);
    }
    let f = tm.mk_false();
    let new_domain = Domain::new(Vec::new(), vec![f], RangeMap::default());
    DomainTransformation {
        new_domain,
        old_domain: domain.clone(),
        new_to_old: FxHashMap::default(),
        old_to_new,
    }
}

/// Compose two transformations: `first` takes the original domain to an
/// intermediate one, `second` continues from there.
pub fn compose(
    tm: &mut ExprManager,
    first: &DomainTransformation,
    second: &DomainTransformation,
) -> Result<DomainTransformation> {
    if second.old_domain != first.new_domain {
        return Err(Error::TransformationMismatch);
    }
    let mut new_to_old = FxHashMap::default();
    for (&v, &e) in &second.new_to_old {
        let through = substitute(tm, e, &first.new_to_old);
        new_to_old.insert(v, simplify(tm, through, &first.old_domain.ranges));
    }
    let mut old_to_new = FxHashMap::default();
    for (&v, &e) in &first.old_to_new {
        let through = substitute(tm, e, &second.old_to_new);
        old_to_new.insert(v, simplify(tm, through, &second.new_domain.ranges));
    }
    Ok(DomainTransformation {
        new_domain: second.new_domain.clone(),
        old_domain: first.old_domain.clone(),
        new_to_old,
        old_to_new,
    })
}

/// Simplify a domain: eliminate division/modulo from its conditions, then
/// alternate equation solving and deskewing.
///
/// The two-round alternation is a deliberate heuristic. One round leaves
/// opportunities on the table because each stage can expose work for the
/// other; a third round produced no further improvement on the workloads
/// this was tuned against.
pub fn simplify_domain(
    tm: &mut ExprManager,
    domain: &Domain,
    eliminate_div_mod: bool,
) -> Result<DomainTransformation> {
    tracing::debug!(domain = %domain.display(tm), "simplifying domain");
    let mut transf = id_transformation(domain);

    if eliminate_div_mod {
        let tr = crate::divmod::eliminate_div_mod_from_domain(tm, &transf.new_domain);
        transf = compose(tm, &transf, &tr)?;
    }

    for _ in 0..2 {
        let tr = crate::equations::solve_system_of_equations(tm, &transf.new_domain);
        transf = compose(tm, &transf, &tr)?;
        let tr = crate::deskew::deskew_domain(tm, &transf.new_domain);
        transf = compose(tm, &transf, &tr)?;
    }

    Ok(transf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroxide_ir::expr::Range;
    use zeroxide_ir::DType;

    fn small_domain(tm: &mut ExprManager) -> Domain {
        let i = tm.mk_var("i", DType::Int32);
        let zero = tm.mk_int(0);
        let ten = tm.mk_int(10);
        let mut ranges = RangeMap::default();
        ranges.insert(
            i,
            Range {
                min: zero,
                extent: ten,
            },
        );
        let five = tm.mk_int(5);
        let cond = tm.mk_lt(i, five);
        Domain::new(vec![i], vec![cond], ranges)
    }

    #[test]
    fn display_reports_the_box_volume() {
        let mut tm = ExprManager::new();
        let d = small_domain(&mut tm);
        let text = format!("{}", d.display(&tm));
        assert!(text.starts_with("Domain(box_volume=10"), "got {text}");
        assert!(text.contains("variables=[i]"), "got {text}");

        // A variable without a range makes the volume unbounded.
        let unranged = Domain::new(d.variables.clone(), d.conditions.clone(), RangeMap::default());
        let text = format!("{}", unranged.display(&tm));
        assert!(text.starts_with("Domain(box_volume=inf"), "got {text}");
    }

    #[test]
    fn identity_is_a_unit() {
        let mut tm = ExprManager::new();
        let d = small_domain(&mut tm);
        let id = id_transformation(&d);
        let composed = compose(&mut tm, &id, &id).unwrap();
        assert_eq!(composed.new_domain, d);
        assert_eq!(composed.old_domain, d);
        assert_eq!(composed.new_to_old, id.new_to_old);
    }

    #[test]
    fn mismatched_composition_is_rejected() {
        let mut tm = ExprManager::new();
        let d = small_domain(&mut tm);
        let id = id_transformation(&d);
        let empty = empty_transformation(&mut tm, &d);
        // empty's new domain is not d, so composing the other way fails.
        assert!(compose(&mut tm, &empty, &id).is_err());
    }

    #[test]
    fn empty_absorbs_on_the_left_boundary() {
        let mut tm = ExprManager::new();
        let d = small_domain(&mut tm);
        let id = id_transformation(&d);
        let empty = empty_transformation(&mut tm, &d);
        let composed = compose(&mut tm, &id, &empty).unwrap();
        assert!(composed.new_domain.variables.is_empty());
        let f = tm.mk_false();
        assert_eq!(composed.new_domain.conditions, vec![f]);
        for &v in &d.variables {
            assert!(tm.is_const_int(composed.old_to_new[&v], 0));
        }
    }
}
