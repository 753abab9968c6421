// Module: formalism/algebra.rs
// Closed-form solving of small equation systems under a wall-clock budget.
// The reasoner tolerates incompleteness here: anything this module cannot
// solve is simply "no information". Soundness is what matters: a returned
// value must satisfy the system.

use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::expressions::{Expr, Number, Rational, Symbol};

/// Highest exponent the polynomial extractor will expand.
const MAX_POLY_DEGREE: u32 = 16;

/// Coefficients below this magnitude are treated as zero during elimination.
const PIVOT_EPS: f64 = 1e-9;

/// Recoverable failure of a `solve` call. Callers log a warning and treat the
/// target as unknown.
#[derive(Debug, Clone, Error)]
pub enum SolveFailure {
    #[error("equation solving exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u128 },
}

/// Cooperative wall-clock budget, checked inside every solver loop.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Deadline {
        Deadline {
            end: Instant::now() + budget,
            budget,
        }
    }

    pub fn check(&self) -> Result<(), SolveFailure> {
        if Instant::now() >= self.end {
            Err(SolveFailure::Timeout {
                budget_ms: self.budget.as_millis(),
            })
        } else {
            Ok(())
        }
    }
}

/// Solve `eqs` (each meaning `expr = 0`) for as many symbols as possible.
///
/// Returns only real, closed-form numeric assignments; parametric families
/// are discarded, and on multi-branch results the first branch is kept.
/// Inconsistent or unsolvable systems yield an empty map. The call is bounded
/// by `budget` and raises [`SolveFailure::Timeout`] on expiry.
pub fn solve(eqs: &[Expr], budget: Duration) -> Result<IndexMap<Symbol, Number>, SolveFailure> {
    let deadline = Deadline::new(budget);
    let mut system: Vec<Expr> = eqs.to_vec();
    let mut values: IndexMap<Symbol, Number> = IndexMap::new();

    loop {
        deadline.check()?;

        if system
            .iter()
            .any(|e| matches!(e, Expr::Num(n) if !n.is_zero()))
        {
            // inconsistent: no assignment satisfies the system
            return Ok(IndexMap::new());
        }
        system.retain(|e| !matches!(e, Expr::Num(_)));
        if system.is_empty() {
            break;
        }

        let mut progress = false;

        // single-symbol equations first: they decide a value outright
        for i in 0..system.len() {
            deadline.check()?;
            let syms = system[i].free_symbols();
            if syms.len() != 1 {
                continue;
            }
            let sym = match syms.into_iter().next() {
                Some(s) => s,
                None => continue,
            };
            if let Some(v) = solve_univariate(&system[i], &sym) {
                substitute_all(&mut system, &sym, &v);
                values.insert(sym, v);
                progress = true;
                break;
            }
        }
        if progress {
            continue;
        }

        // linear subsystem via Gaussian elimination
        let mut rows: Vec<(BTreeMap<Symbol, Number>, Number)> = Vec::new();
        for eq in &system {
            if let Some(row) = linear_form(eq) {
                if !row.0.is_empty() {
                    rows.push(row);
                }
            }
        }
        if rows.len() >= 2 {
            let solved = solve_linear(rows, &deadline)?;
            for (sym, v) in solved {
                if !values.contains_key(&sym) {
                    substitute_all(&mut system, &sym, &v);
                    values.insert(sym, v);
                    progress = true;
                }
            }
        }

        if !progress {
            break;
        }
    }

    Ok(values)
}

fn substitute_all(system: &mut [Expr], sym: &Symbol, value: &Number) {
    let v = Expr::Num(*value);
    for eq in system.iter_mut() {
        if eq.contains_symbol(sym) {
            *eq = eq.subs(sym, &v);
        }
    }
}

/// Extract `expr` as a linear combination `sum coeff_i * sym_i + constant`.
/// Returns `None` when the expression is not linear in its symbols.
pub fn linear_form(expr: &Expr) -> Option<(BTreeMap<Symbol, Number>, Number)> {
    let mut coeffs: BTreeMap<Symbol, Number> = BTreeMap::new();
    let mut constant = Number::int(0);
    collect_linear(expr, &Number::int(1), &mut coeffs, &mut constant)?;
    coeffs.retain(|_, c| !c.is_zero());
    Some((coeffs, constant))
}

fn collect_linear(
    expr: &Expr,
    scale: &Number,
    coeffs: &mut BTreeMap<Symbol, Number>,
    constant: &mut Number,
) -> Option<()> {
    match expr {
        Expr::Num(n) => {
            *constant = constant.add(&scale.mul(n));
            Some(())
        }
        Expr::Sym(s) => {
            let entry = coeffs.entry(s.clone()).or_insert_with(|| Number::int(0));
            *entry = entry.add(scale);
            Some(())
        }
        Expr::Add(terms) => {
            for t in terms {
                collect_linear(t, scale, coeffs, constant)?;
            }
            Some(())
        }
        Expr::Mul(factors) => {
            // linear only as numeric-coefficient times a single symbol
            let mut num = *scale;
            let mut sym: Option<&Symbol> = None;
            for f in factors {
                match f {
                    Expr::Num(n) => num = num.mul(n),
                    Expr::Sym(s) if sym.is_none() => sym = Some(s),
                    _ => return None,
                }
            }
            match sym {
                Some(s) => {
                    let entry = coeffs.entry(s.clone()).or_insert_with(|| Number::int(0));
                    *entry = entry.add(&num);
                }
                None => *constant = constant.add(&num),
            }
            Some(())
        }
        Expr::Pow(_, _) | Expr::Func(_, _) => None,
    }
}

/// Extract univariate polynomial coefficients of `expr` in `sym`, keyed by
/// degree. `None` when the expression is not polynomial in `sym` or mentions
/// another symbol.
pub fn poly_coeffs(expr: &Expr, sym: &Symbol) -> Option<BTreeMap<u32, Number>> {
    match expr {
        Expr::Num(n) => Some(BTreeMap::from([(0, *n)])),
        Expr::Sym(s) => {
            if s == sym {
                Some(BTreeMap::from([(1, Number::int(1))]))
            } else {
                None
            }
        }
        Expr::Add(terms) => {
            let mut acc: BTreeMap<u32, Number> = BTreeMap::new();
            for t in terms {
                for (deg, c) in poly_coeffs(t, sym)? {
                    let entry = acc.entry(deg).or_insert_with(|| Number::int(0));
                    *entry = entry.add(&c);
                }
            }
            Some(acc)
        }
        Expr::Mul(factors) => {
            let mut acc: BTreeMap<u32, Number> = BTreeMap::from([(0, Number::int(1))]);
            for f in factors {
                acc = poly_mul(&acc, &poly_coeffs(f, sym)?)?;
            }
            Some(acc)
        }
        Expr::Pow(base, exp) => {
            let k = exp.as_number().and_then(|n| n.as_integer())?;
            if k < 0 || k as u32 > MAX_POLY_DEGREE {
                return None;
            }
            let base = poly_coeffs(base, sym)?;
            let mut acc: BTreeMap<u32, Number> = BTreeMap::from([(0, Number::int(1))]);
            for _ in 0..k {
                acc = poly_mul(&acc, &base)?;
            }
            Some(acc)
        }
        Expr::Func(_, _) => None,
    }
}

fn poly_mul(
    a: &BTreeMap<u32, Number>,
    b: &BTreeMap<u32, Number>,
) -> Option<BTreeMap<u32, Number>> {
    let mut out: BTreeMap<u32, Number> = BTreeMap::new();
    for (da, ca) in a {
        for (db, cb) in b {
            let deg = da + db;
            if deg > MAX_POLY_DEGREE {
                return None;
            }
            let entry = out.entry(deg).or_insert_with(|| Number::int(0));
            *entry = entry.add(&ca.mul(cb));
        }
    }
    Some(out)
}

/// Solve a single-symbol equation `expr = 0` for `sym`. Real closed-form
/// roots only; quadratics take the `+sqrt` branch.
pub fn solve_univariate(expr: &Expr, sym: &Symbol) -> Option<Number> {
    let mut coeffs = poly_coeffs(expr, sym)?;
    coeffs.retain(|_, c| !c.is_zero());
    let degree = *coeffs.keys().max()?;

    match degree {
        0 => None,
        1 => {
            let c1 = coeffs.get(&1)?;
            let c0 = coeffs.get(&0).copied().unwrap_or_else(|| Number::int(0));
            c0.neg().div(c1)
        }
        2 if coeffs.len() <= 3 => {
            let a = coeffs.get(&2).copied().unwrap_or_else(|| Number::int(0));
            let b = coeffs.get(&1).copied().unwrap_or_else(|| Number::int(0));
            let c = coeffs.get(&0).copied().unwrap_or_else(|| Number::int(0));
            let four_ac = Number::int(4).mul(&a).mul(&c);
            let disc = b.mul(&b).sub(&four_ac);
            if disc.as_f64() < 0.0 {
                return None;
            }
            let root = sqrt_number(&disc)?;
            // first branch: -b + sqrt(disc)
            b.neg().add(&root).div(&Number::int(2).mul(&a))
        }
        n => {
            // pure n-th power: c_n * x^n + c_0 = 0
            if coeffs.len() > 2 || (coeffs.len() == 2 && !coeffs.contains_key(&0)) {
                return None;
            }
            let cn = coeffs.get(&n)?;
            let c0 = coeffs.get(&0).copied().unwrap_or_else(|| Number::int(0));
            let rhs = c0.neg().div(cn)?;
            nth_root(&rhs, n)
        }
    }
}

/// Real square root, exact on perfect-square rationals.
fn sqrt_number(n: &Number) -> Option<Number> {
    let v = n.as_f64();
    if v < 0.0 {
        return None;
    }
    if let Some(r) = n.as_rational() {
        if let (Some(sn), Some(sd)) = (perfect_sqrt(r.num()), perfect_sqrt(r.den())) {
            return Rational::new(sn, sd).map(Number::Rational);
        }
    }
    Some(Number::real(v.sqrt()))
}

fn perfect_sqrt(n: i64) -> Option<i64> {
    if n < 0 {
        return None;
    }
    let root = (n as f64).sqrt().round() as i64;
    for cand in root.saturating_sub(1)..=root + 1 {
        if cand >= 0 && cand.checked_mul(cand) == Some(n) {
            return Some(cand);
        }
    }
    None
}

/// Real first-branch n-th root: positive root for even n, sign-preserving
/// for odd n.
fn nth_root(value: &Number, n: u32) -> Option<Number> {
    let v = value.as_f64();
    if n % 2 == 0 {
        if v < 0.0 {
            return None;
        }
        Some(Number::real(v.powf(1.0 / n as f64)))
    } else {
        Some(Number::real(v.signum() * v.abs().powf(1.0 / n as f64)))
    }
}

fn negligible(n: &Number) -> bool {
    match n {
        Number::Rational(r) => r.is_zero(),
        Number::Real(v) => v.abs() < PIVOT_EPS,
    }
}

/// Gaussian elimination over [`Number`] with partial pivoting. Only fully
/// determined symbols are returned; under-determined rows are parametric and
/// contribute nothing.
fn solve_linear(
    rows: Vec<(BTreeMap<Symbol, Number>, Number)>,
    deadline: &Deadline,
) -> Result<IndexMap<Symbol, Number>, SolveFailure> {
    let mut syms: BTreeSet<Symbol> = BTreeSet::new();
    for (coeffs, _) in &rows {
        syms.extend(coeffs.keys().cloned());
    }
    let syms: Vec<Symbol> = syms.into_iter().collect();
    let cols = syms.len();

    // augmented matrix: coeff columns then the negated constant
    let mut matrix: Vec<Vec<Number>> = rows
        .iter()
        .map(|(coeffs, constant)| {
            let mut row: Vec<Number> = syms
                .iter()
                .map(|s| coeffs.get(s).copied().unwrap_or_else(|| Number::int(0)))
                .collect();
            row.push(constant.neg());
            row
        })
        .collect();

    let mut pivot_row = 0;
    for col in 0..cols {
        deadline.check()?;
        let best = (pivot_row..matrix.len())
            .filter(|&r| !negligible(&matrix[r][col]))
            .max_by(|&a, &b| {
                matrix[a][col]
                    .as_f64()
                    .abs()
                    .partial_cmp(&matrix[b][col].as_f64().abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        let best = match best {
            Some(r) => r,
            None => continue,
        };
        matrix.swap(pivot_row, best);

        let pivot = matrix[pivot_row][col];
        for r in 0..matrix.len() {
            if r == pivot_row || negligible(&matrix[r][col]) {
                continue;
            }
            let factor = match matrix[r][col].div(&pivot) {
                Some(f) => f,
                None => continue,
            };
            for c in col..=cols {
                let delta = factor.mul(&matrix[pivot_row][c]);
                matrix[r][c] = matrix[r][c].sub(&delta);
            }
        }
        pivot_row += 1;
        if pivot_row == matrix.len() {
            break;
        }
    }

    let mut values: IndexMap<Symbol, Number> = IndexMap::new();
    for row in &matrix {
        deadline.check()?;
        let live: Vec<usize> = (0..cols).filter(|&c| !negligible(&row[c])).collect();
        match live.len() {
            0 => {
                if !negligible(&row[cols]) {
                    // inconsistent system
                    return Ok(IndexMap::new());
                }
            }
            1 => {
                let col = live[0];
                if let Some(v) = row[cols].div(&row[col]) {
                    values.insert(syms[col].clone(), v);
                }
            }
            _ => {} // parametric row
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(name: &str) -> Expr {
        Expr::sym(name)
    }

    fn budget() -> Duration {
        Duration::from_millis(2000)
    }

    #[test]
    fn chained_linear_system() {
        // a - 3 = 0, b - a - 4 = 0
        let eqs = vec![
            Expr::sub(s("a"), Expr::int(3)),
            Expr::sub(Expr::sub(s("b"), s("a")), Expr::int(4)),
        ];
        let result = solve(&eqs, budget()).unwrap();
        assert_eq!(result.get(&Symbol::new("a")), Some(&Number::int(3)));
        assert_eq!(result.get(&Symbol::new("b")), Some(&Number::int(7)));
    }

    #[test]
    fn simultaneous_linear_system() {
        // x + y - 5 = 0, x - y - 1 = 0
        let eqs = vec![
            Expr::sub(Expr::add(vec![s("x"), s("y")]), Expr::int(5)),
            Expr::sub(Expr::sub(s("x"), s("y")), Expr::int(1)),
        ];
        let result = solve(&eqs, budget()).unwrap();
        assert_eq!(result.get(&Symbol::new("x")), Some(&Number::int(3)));
        assert_eq!(result.get(&Symbol::new("y")), Some(&Number::int(2)));
    }

    #[test]
    fn parametric_family_is_discarded() {
        let eqs = vec![Expr::sub(Expr::add(vec![s("x"), s("y")]), Expr::int(5))];
        let result = solve(&eqs, budget()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn quadratic_takes_first_branch() {
        // x^2 - 4 = 0 -> +2
        let eq = Expr::sub(Expr::pow(s("x"), Expr::int(2)), Expr::int(4));
        let result = solve(&[eq], budget()).unwrap();
        assert_eq!(result.get(&Symbol::new("x")), Some(&Number::int(2)));

        // x^2 - 2x - 3 = 0 -> (2 + 4) / 2 = 3
        let eq = Expr::add(vec![
            Expr::pow(s("x"), Expr::int(2)),
            Expr::mul(vec![Expr::int(-2), s("x")]),
            Expr::int(-3),
        ]);
        let result = solve(&[eq], budget()).unwrap();
        assert_eq!(result.get(&Symbol::new("x")), Some(&Number::int(3)));
    }

    #[test]
    fn negative_discriminant_yields_nothing() {
        // x^2 + 1 = 0 has no real root
        let eq = Expr::add(vec![Expr::pow(s("x"), Expr::int(2)), Expr::int(1)]);
        let result = solve(&[eq], budget()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn mixed_linear_and_quadratic() {
        // a - 3 = 0, b^2 - a^2 - 16 = 0 -> b = 5
        let eqs = vec![
            Expr::sub(s("a"), Expr::int(3)),
            Expr::sub(
                Expr::sub(
                    Expr::pow(s("b"), Expr::int(2)),
                    Expr::pow(s("a"), Expr::int(2)),
                ),
                Expr::int(16),
            ),
        ];
        let result = solve(&eqs, budget()).unwrap();
        assert_eq!(result.get(&Symbol::new("b")), Some(&Number::int(5)));
    }

    #[test]
    fn inconsistent_system_yields_nothing() {
        // x - 1 = 0 and x - 2 = 0
        let eqs = vec![
            Expr::sub(s("x"), Expr::int(1)),
            Expr::sub(s("x"), Expr::int(2)),
        ];
        let result = solve(&eqs, budget()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn zero_budget_times_out() {
        let eq = Expr::sub(s("x"), Expr::int(1));
        let err = solve(&[eq], Duration::ZERO);
        assert!(matches!(err, Err(SolveFailure::Timeout { .. })));
    }

    #[test]
    fn results_round_to_six_decimals() {
        // 3x - 1 = 0 stays exact; x^2 - 2 = 0 rounds
        let eq = Expr::sub(Expr::pow(s("x"), Expr::int(2)), Expr::int(2));
        let result = solve(&[eq], budget()).unwrap();
        let v = result.get(&Symbol::new("x")).copied();
        assert_eq!(v.map(|n| n.as_f64()), Some(1.414214));
    }
}
