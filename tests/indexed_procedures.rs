//! Integration tests for systems with index families

use approx::assert_relative_eq;
use odegen::prelude::*;
use odegen::ir::{LayoutEntry, Node};
use odegen::symbolic::{Bindings, Bound};
use odegen::CompiledProcedure;

/// `n_i' = Σ_{j≠i} J (n_j - n_i)` over `1..=upper`
fn exchange(upper: impl Into<Bound> + Clone) -> EquationSet {
    let i = Index::new("i", 1, upper.clone());
    let j = Index::new("j", 1, upper);
    let n_i = Expr::indexed("n", [i.clone()]);
    let n_j = Expr::indexed("n", [j.clone()]);
    EquationSet::from_pairs([(
        n_i.clone(),
        Expr::sum_distinct(j, [i], Expr::sym("J") * (n_j - n_i)),
    )])
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

mod evaluation {
    use super::*;

    #[test]
    fn test_two_site_exchange() {
        let f = generate_procedure::<f64>(&exchange(2), &[Expr::sym("J")], &Options::default())
            .unwrap();

        let mut du = [0.0; 2];
        f.call(&mut du, &[1.0, 0.5], &[1.0], 0.0).unwrap();
        assert_relative_eq!(du[0], -0.5);
        assert_relative_eq!(du[1], 0.5);
    }

    #[test]
    fn test_scalar_prologue_offsets_family() {
        let i = Index::new("i", 1, 2);
        let j = Index::new("j", 1, 2);
        let n_i = Expr::indexed("n", [i.clone()]);
        let n_j = Expr::indexed("n", [j.clone()]);
        // family listed first; scalars are still placed ahead of it
        let eqs = EquationSet::from_pairs([
            (
                n_i.clone(),
                Expr::sum_distinct(j, [i], Expr::sym("J") * (n_j - n_i)),
            ),
            (Expr::sym("a"), -Expr::sym("g") * Expr::sym("a")),
        ])
        .unwrap();
        let params = [Expr::sym("J"), Expr::sym("g")];
        let f = generate_procedure::<f64>(&eqs, &params, &Options::default()).unwrap();

        let mut du = [0.0; 3];
        f.call(&mut du, &[2.0, 1.0, 0.5], &[1.0, 0.5], 0.0).unwrap();
        assert_relative_eq!(du[0], -1.0);
        assert_relative_eq!(du[1], -0.5);
        assert_relative_eq!(du[2], 0.5);
        assert_eq!(f.procedure().loop_depth(), 1);
    }

    #[test]
    fn test_parameter_bound_resolves_at_call() {
        let params = [Expr::sym("J"), Expr::sym("N")];
        let f = generate_procedure::<f64>(&exchange("N"), &params, &Options::default()).unwrap();

        let mut du = [0.0; 3];
        f.call(&mut du, &[1.0, 0.0, 0.0], &[1.0, 3.0], 0.0).unwrap();
        assert_relative_eq!(du[0], -2.0);
        assert_relative_eq!(du[1], 1.0);
        assert_relative_eq!(du[2], 1.0);
    }

    #[test]
    fn test_indexed_parameter_family() {
        let i = Index::new("i", 1, 2);
        let j = Index::new("j", 1, 2);
        let coupling = Expr::indexed("J", [i.clone(), j.clone()]);
        let eqs = EquationSet::from_pairs([(
            Expr::indexed("n", [i.clone()]),
            Expr::sum_distinct(j.clone(), [i], coupling.clone() * Expr::indexed("n", [j])),
        )])
        .unwrap();
        let f = generate_procedure::<f64>(&eqs, &[coupling], &Options::default()).unwrap();

        // row-major: J_11, J_12, J_21, J_22
        let mut du = [0.0; 2];
        f.call(&mut du, &[1.0, 10.0], &[0.0, 2.0, 3.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(du[0], 20.0);
        assert_relative_eq!(du[1], 3.0);
    }

    #[test]
    fn test_matches_direct_evaluation_per_site() {
        let eqs = exchange(3);
        let f = generate_procedure::<f64>(&eqs, &[Expr::sym("J")], &Options::default()).unwrap();
        let u = [0.3, -1.2, 2.5];
        let mut du = [0.0; 3];
        f.call(&mut du, &u, &[0.7], 0.0).unwrap();

        let bindings = (1..=3).fold(Bindings::new().with("J", 0.7), |b, site| {
            b.with_site("n", [site], u[site as usize - 1])
        });
        let i = Index::new("i", 1, 3);
        let rhs = eqs.equations()[0].rhs();
        for site in 1..=3 {
            let expected = rhs.evaluate_with_sites(&bindings, &[(i.clone(), site)]).unwrap();
            assert_relative_eq!(du[site as usize - 1], expected.re, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_batch_matches_single_calls() {
        use ndarray::Array2;

        let f = generate_procedure::<f64>(&exchange(2), &[Expr::sym("J")], &Options::default())
            .unwrap();
        let u = Array2::from_shape_vec((3, 2), vec![1.0, 0.5, 0.0, 1.0, 2.0, 2.0]).unwrap();
        let mut du = Array2::zeros((3, 2));
        f.call_batch(&mut du, &u, &[1.0], 0.0).unwrap();

        for (row, state) in u.rows().into_iter().enumerate() {
            let mut single = [0.0; 2];
            f.call(&mut single, &state.to_vec(), &[1.0], 0.0).unwrap();
            assert_relative_eq!(du[[row, 0]], single[0]);
            assert_relative_eq!(du[[row, 1]], single[1]);
        }
    }

    /// `n_i' = n_i`, `m_k' = 2 n_k + m_k` over `1..=upper`, after `a' = -g a`
    fn two_families(upper: impl Into<Bound> + Clone) -> EquationSet {
        let i = Index::new("i", 1, upper.clone());
        let k = Index::new("k", 1, upper);
        let n_i = Expr::indexed("n", [i]);
        let n_k = Expr::indexed("n", [k.clone()]);
        let m_k = Expr::indexed("m", [k]);
        EquationSet::from_pairs([
            (n_i.clone(), n_i),
            (m_k.clone(), Expr::num(2.0) * n_k + m_k),
            (Expr::sym("a"), -Expr::sym("g") * Expr::sym("a")),
        ])
        .unwrap()
    }

    #[test]
    fn test_second_family_follows_the_first() {
        let f = generate_procedure::<f64>(&two_families(2), &[Expr::sym("g")], &Options::default())
            .unwrap();

        let mut du = [0.0; 5];
        f.call(&mut du, &[2.0, 1.0, 2.0, 10.0, 20.0], &[0.5], 0.0).unwrap();
        assert_eq!(du, [-1.0, 1.0, 2.0, 12.0, 24.0]);
        assert_eq!(
            f.procedure().states()[2],
            LayoutEntry::Family {
                name: "m".into(),
                start: Node::int(3),
                len: Node::int(2),
            }
        );
    }

    #[test]
    fn test_second_family_start_with_parameter_bound() {
        let params = [Expr::sym("g"), Expr::sym("N")];
        let f = generate_procedure::<f64>(&two_families("N"), &params, &Options::default()).unwrap();

        let LayoutEntry::Family { start, .. } = &f.procedure().states()[2] else {
            panic!("expected a family entry");
        };
        assert!(start.as_const().is_none());

        let mut du = [0.0; 7];
        let u = [2.0, 1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        f.call(&mut du, &u, &[0.5, 3.0], 0.0).unwrap();
        assert_eq!(du, [-1.0, 1.0, 2.0, 3.0, 12.0, 24.0, 36.0]);
    }

    #[test]
    fn test_distinct_guard_drops_the_diagonal() {
        let i = Index::new("i", 1, 3);
        let j = Index::new("j", 1, 3);
        let l = Index::new("l", 1, 3);
        let rhs = Expr::sum(
            j.clone(),
            Expr::distinct(i.clone(), j.clone(), Expr::indexed("n", [j])),
        );
        let eqs = EquationSet::from_pairs([
            (Expr::indexed("n", [i.clone()]), rhs.clone()),
            (Expr::sym("total"), Expr::sum(l.clone(), Expr::indexed("n", [l]))),
        ])
        .unwrap();
        let f = generate_procedure::<f64>(&eqs, &[], &Options::default()).unwrap();

        let u = [0.0, 1.0, 2.0, 4.0];
        let mut du = [0.0; 4];
        f.call(&mut du, &u, &[], 0.0).unwrap();
        assert_eq!(du, [7.0, 6.0, 5.0, 3.0]);

        let bindings = (1..=3).fold(Bindings::new(), |b, site| {
            b.with_site("n", [site], u[site as usize])
        });
        for site in 1..=3 {
            let expected = rhs.evaluate_with_sites(&bindings, &[(i.clone(), site)]).unwrap();
            assert_relative_eq!(du[site as usize], expected.re, epsilon = 1e-12);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Failure Modes
// ═══════════════════════════════════════════════════════════════════════════════

mod failures {
    use super::*;

    #[test]
    fn test_nested_indices_are_unsupported() {
        let i = Index::new("i", 1, 2);
        let j = Index::new("j", 1, 2);
        let eqs = EquationSet::from_pairs([(
            Expr::indexed("rho", [i.clone(), j.clone()]),
            Expr::indexed("rho", [i, j]),
        )])
        .unwrap();
        let err = build_procedure(&eqs, &[], &Options::default()).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedDepth { depth: 2, .. }));
    }

    #[test]
    fn test_unresolved_bound_fails_at_call() {
        // N is neither a literal nor a parameter
        let f = generate_procedure::<f64>(&exchange("N"), &[Expr::sym("J")], &Options::default())
            .unwrap();

        let mut du = [0.0; 2];
        let err = f.call(&mut du, &[1.0, 0.5], &[1.0], 0.0).unwrap_err();
        assert_eq!(err, RuntimeError::UnresolvedSymbol { name: "N".into() });
    }

    #[test]
    fn test_short_state_is_out_of_bounds() {
        let f = generate_procedure::<f64>(&exchange(3), &[Expr::sym("J")], &Options::default())
            .unwrap();

        let mut du = [0.0; 3];
        let err = f.call(&mut du, &[1.0, 0.5], &[1.0], 0.0).unwrap_err();
        assert!(matches!(err, RuntimeError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_relabel_limit() {
        let options = Options::default().with_max_relabel_rules(1);
        let err = build_procedure(&exchange(2), &[Expr::sym("J")], &options).unwrap_err();
        assert!(matches!(err, CodegenError::RelabelLimit { limit: 1, .. }));
    }

    #[test]
    fn test_mismatched_family_ranges() {
        let i = Index::new("i", 1, 2);
        let k = Index::new("k", 1, 3);
        let eqs = EquationSet::from_pairs([
            (Expr::indexed("n", [i.clone()]), Expr::indexed("n", [i])),
            (Expr::indexed("m", [k.clone()]), Expr::indexed("m", [k])),
        ])
        .unwrap();
        let err = build_procedure(&eqs, &[], &Options::default()).unwrap_err();
        assert!(matches!(err, CodegenError::InconsistentIndex { .. }));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bounds Checks
// ═══════════════════════════════════════════════════════════════════════════════

mod bounds_checks {
    use super::*;

    fn unchecked(upper: i64) -> CompiledProcedure<f64> {
        let options = Options::default().with_bounds_check(false);
        generate_procedure::<f64>(&exchange(upper), &[Expr::sym("J")], &options).unwrap()
    }

    #[test]
    fn test_unchecked_matches_checked_on_valid_input() {
        let checked =
            generate_procedure::<f64>(&exchange(3), &[Expr::sym("J")], &Options::default())
                .unwrap();
        let unchecked = unchecked(3);
        assert!(!unchecked.procedure().check_bounds());

        let u = [0.3, -1.2, 2.5];
        let mut expected = [0.0; 3];
        let mut got = [0.0; 3];
        checked.call(&mut expected, &u, &[0.7], 0.0).unwrap();
        unchecked.call(&mut got, &u, &[0.7], 0.0).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    #[should_panic]
    fn test_unchecked_short_state_is_not_reported() {
        let f = unchecked(3);
        let mut du = [0.0; 3];
        // plain slice indexing past the end of `u`
        let _ = f.call(&mut du, &[1.0, 0.5], &[1.0], 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Determinism
// ═══════════════════════════════════════════════════════════════════════════════

mod determinism {
    use super::*;

    #[test]
    fn test_repeated_builds_are_identical() {
        let first = build_procedure(&exchange(4), &[Expr::sym("J")], &Options::default()).unwrap();
        let second = build_procedure(&exchange(4), &[Expr::sym("J")], &Options::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.render_source(), second.render_source());
    }

    #[test]
    fn test_zero_fill_is_idempotent() {
        let i = Index::new("i", 1, 2);
        let eqs = EquationSet::from_pairs([(
            Expr::indexed("n", [i.clone()]),
            Expr::sym("h") * Expr::indexed("n", [i]) + Expr::sym("g"),
        )])
        .unwrap();
        let options = Options::default().with_unknowns_zero(true);

        let once = build_procedure(&eqs, &[Expr::sym("g")], &options).unwrap();
        let missing = odegen::validate::check_missing_indexed(&eqs.rhs(), &eqs.lhs(), &[Expr::sym("g")]);
        let reduced = eqs.remove_unknowns(&missing);
        let twice = build_procedure(&reduced, &[Expr::sym("g")], &options).unwrap();

        assert_eq!(once, twice);
    }
}
