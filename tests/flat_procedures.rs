//! Integration tests for systems without index families

use approx::assert_relative_eq;
use odegen::prelude::*;
use odegen::symbolic::Bindings;
use odegen::Complex64;
use rand::Rng;

fn decay_chain() -> (EquationSet, Vec<Expr>) {
    symbols!(a, b, gamma, kappa);
    let eqs = EquationSet::from_pairs([
        (a.clone(), -gamma.clone() * a.clone()),
        (b, kappa.clone() * a),
    ])
    .unwrap();
    (eqs, vec![gamma, kappa])
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numerical Agreement
// ═══════════════════════════════════════════════════════════════════════════════

mod agreement {
    use super::*;

    #[test]
    fn test_matches_direct_evaluation() {
        let (eqs, params) = decay_chain();
        let f = generate_procedure::<f64>(&eqs, &params, &Options::default()).unwrap();
        let mut rng = rand::rng();

        for _ in 0..8 {
            let u = [rng.random_range(-2.0..2.0), rng.random_range(-2.0..2.0)];
            let p = [rng.random_range(0.1..3.0), rng.random_range(0.1..3.0)];
            let mut du = [0.0; 2];
            f.call(&mut du, &u, &p, 0.0).unwrap();

            let bindings = Bindings::new()
                .with("a", u[0])
                .with("b", u[1])
                .with("gamma", p[0])
                .with("kappa", p[1]);
            for (eq, got) in eqs.iter().zip(du) {
                let expected = eq.rhs().evaluate(&bindings).unwrap();
                assert_relative_eq!(got, expected.re, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_slots_follow_equation_order() {
        let (eqs, params) = decay_chain();
        let f = generate_procedure::<f64>(&eqs, &params, &Options::default()).unwrap();

        let mut du = [0.0; 2];
        f.call(&mut du, &[2.0, 0.0], &[0.5, 3.0], 0.0).unwrap();
        assert_relative_eq!(du[0], -1.0);
        assert_relative_eq!(du[1], 6.0);
    }

    #[test]
    fn test_time_dependent_forcing() {
        symbols!(a, k, t);
        let eqs = EquationSet::from_pairs([(a, k * t.clone().sin())])
            .unwrap()
            .with_time("t");
        let f = generate_procedure::<f64>(&eqs, &[Expr::sym("k")], &Options::default()).unwrap();

        let mut du = [0.0];
        f.call(&mut du, &[1.0], &[2.0], 0.3).unwrap();
        assert_relative_eq!(du[0], 2.0 * 0.3_f64.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_custom_tokens_show_in_source() {
        let (eqs, params) = decay_chain();
        let options = Options::default().with_tokens("x", "theta", "s");
        let procedure = build_procedure(&eqs, &params, &options).unwrap();

        let source = procedure.render_source();
        assert!(source.contains("dx: &mut"));
        assert!(source.contains("theta[0]"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Complex Arithmetic
// ═══════════════════════════════════════════════════════════════════════════════

mod complex {
    use super::*;

    fn rotation() -> EquationSet {
        symbols!(c, omega);
        EquationSet::from_pairs([(c.clone(), -Expr::imaginary_unit() * omega * c)]).unwrap()
    }

    #[test]
    fn test_imaginary_unit_over_complex() {
        let f = generate_procedure::<Complex64>(&rotation(), &[Expr::sym("omega")], &Options::default())
            .unwrap();

        let mut du = [Complex64::new(0.0, 0.0)];
        f.call(&mut du, &[Complex64::new(1.0, 0.0)], &[Complex64::new(2.0, 0.0)], 0.0)
            .unwrap();
        assert_relative_eq!(du[0].re, 0.0, epsilon = 1e-12);
        assert_relative_eq!(du[0].im, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_imaginary_unit_over_real_is_rejected() {
        let err = generate_procedure::<f64>(&rotation(), &[Expr::sym("omega")], &Options::default())
            .unwrap_err();
        assert!(matches!(err, CodegenError::ComplexUnsupported { scalar: "f64" }));
    }

    #[test]
    fn test_adjoint_becomes_conjugate() {
        symbols!(c);
        let eqs = EquationSet::from_pairs([(c.clone(), c.adjoint())]).unwrap();
        let f = generate_procedure::<Complex64>(&eqs, &[], &Options::default()).unwrap();

        let mut du = [Complex64::new(0.0, 0.0)];
        f.call(&mut du, &[Complex64::new(1.0, 2.0)], &[], 0.0).unwrap();
        assert_eq!(du[0], Complex64::new(1.0, -2.0));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Missing Symbols
// ═══════════════════════════════════════════════════════════════════════════════

mod missing {
    use super::*;
    use odegen::codegen::compile_flat;

    fn with_source() -> EquationSet {
        symbols!(a, g, s);
        EquationSet::from_pairs([(a.clone(), -g * a + s)]).unwrap()
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        let err = build_procedure(&with_source(), &[Expr::sym("g")], &Options::default()).unwrap_err();
        match err {
            CodegenError::MissingSymbols { names } => assert_eq!(names, vec!["s".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_fill_drops_unknown_symbol() {
        let options = Options::default().with_unknowns_zero(true);
        let f = generate_procedure::<f64>(&with_source(), &[Expr::sym("g")], &options).unwrap();

        let mut du = [0.0];
        f.call(&mut du, &[4.0], &[0.25], 0.0).unwrap();
        assert_relative_eq!(du[0], -1.0);
        assert_eq!(f.procedure().params().len(), 1);
        assert_eq!(f.procedure().states().len(), 1);
    }

    #[test]
    fn test_length_mismatch() {
        let err = compile_flat(
            &[Expr::num(1.0)],
            &[Expr::sym("a"), Expr::sym("b")],
            &[],
            None,
            &Options::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::LengthMismatch { lhs: 2, rhs: 1 }));
    }
}
