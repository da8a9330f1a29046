//! Algebraic properties of the condition lattice.

use proptest::prelude::*;

use worldloom::cond::{self, Cond};
use worldloom::store::{Ctx, Obj};
use worldloom::typedef::OBJECT;

fn cx() -> Ctx {
    Obj::new(&OBJECT).ctx()
}

fn arb_cond() -> impl Strategy<Value = Cond> {
    let leaf = prop_oneof![
        Just(Cond::True),
        Just(Cond::False),
        "[a-d]{1,2}".prop_map(|name| Cond::placeholder(&name)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        (1..4i64, prop::collection::vec(inner, 0..4))
            .prop_map(|(count, conds)| cond::at_least(count, conds))
    })
}

proptest! {
    /// Simplification is idempotent.
    #[test]
    fn simplify_is_idempotent(c in arb_cond()) {
        let cx = cx();
        let once = c.simplify(&cx).unwrap();
        let twice = once.simplify(&cx).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// A term is never both known true and known false.
    #[test]
    fn truth_values_are_exclusive(c in arb_cond()) {
        let cx = cx();
        prop_assert!(!(c.is_known_true(&cx) && c.is_known_false(&cx)));
    }

    /// Simplification preserves decided truth.
    #[test]
    fn simplify_preserves_truth(c in arb_cond()) {
        let cx = cx();
        let s = c.simplify(&cx).unwrap();
        if c.is_known_true(&cx) {
            prop_assert_eq!(s, Cond::True);
        } else if c.is_known_false(&cx) {
            prop_assert_eq!(s, Cond::False);
        }
    }

    /// Disjunction construction flattens associatively.
    #[test]
    fn any_flattens(a in arb_cond(), b in arb_cond(), c in arb_cond()) {
        let nested = cond::any(vec![cond::any(vec![a.clone(), b.clone()]), c.clone()]);
        let flat = cond::any(vec![a, b, c]);
        prop_assert_eq!(nested, flat);
    }

    /// Substituting an absent placeholder changes nothing.
    #[test]
    fn bogus_substitution_is_identity(c in arb_cond()) {
        let after = c.substitute(cond::Target::Name("zzz"), &Cond::True, None);
        prop_assert_eq!(after, c);
    }
}

#[test]
fn at_least_boundary_constants() {
    assert_eq!(cond::at_least(0, vec![]), Cond::True);
    assert_eq!(cond::at_least(1, vec![]), Cond::False);
}
