// Module: formalism/expressions.rs
// Symbolic expressions over named attribute symbols and rational constants.
// Expressions are canonicalized on construction so that structural equality
// and hashing coincide with algebraic identity (a - b equals -(b - a)).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Decimal places kept when a real value is committed.
pub const ROUND_DECIMALS: i32 = 6;

fn round6(v: f64) -> f64 {
    let scale = 10f64.powi(ROUND_DECIMALS);
    (v * scale).round() / scale
}

/// A reduced fraction: den > 0 and gcd(|num|, den) = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd_i64(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Rational {
    /// Build a reduced fraction. Returns `None` when `den` is zero.
    pub fn new(num: i64, den: i64) -> Option<Rational> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd_i64(num, den).max(1);
        Some(Rational {
            num: sign * (num / g),
            den: (den / g).abs(),
        })
    }

    pub fn from_int(n: i64) -> Rational {
        Rational { num: n, den: 1 }
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_one(&self) -> bool {
        self.num == 1 && self.den == 1
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    fn from_i128(num: i128, den: i128) -> Option<Rational> {
        if den == 0 {
            return None;
        }
        let (mut num, mut den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = {
            let (mut a, mut b) = (num.abs(), den);
            while b != 0 {
                let t = a % b;
                a = b;
                b = t;
            }
            a.max(1)
        };
        num /= g;
        den /= g;
        if num > i64::MAX as i128 || num < i64::MIN as i128 || den > i64::MAX as i128 {
            return None;
        }
        Some(Rational {
            num: num as i64,
            den: den as i64,
        })
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(&self, other: &Rational) -> Option<Rational> {
        let num = self.num as i128 * other.den as i128 + other.num as i128 * self.den as i128;
        let den = self.den as i128 * other.den as i128;
        Rational::from_i128(num, den)
    }

    pub fn checked_mul(&self, other: &Rational) -> Option<Rational> {
        Rational::from_i128(
            self.num as i128 * other.num as i128,
            self.den as i128 * other.den as i128,
        )
    }

    pub fn checked_div(&self, other: &Rational) -> Option<Rational> {
        if other.num == 0 {
            return None;
        }
        Rational::from_i128(
            self.num as i128 * other.den as i128,
            self.den as i128 * other.num as i128,
        )
    }

    pub fn checked_neg(&self) -> Option<Rational> {
        self.num.checked_neg().map(|num| Rational { num, den: self.den })
    }

    /// Integer power; `None` on overflow or `0^-k`.
    pub fn checked_pow(&self, exp: i64) -> Option<Rational> {
        if exp == 0 {
            return Some(Rational::from_int(1));
        }
        let (base, times) = if exp < 0 {
            (Rational::from_int(1).checked_div(self)?, exp.unsigned_abs())
        } else {
            (*self, exp.unsigned_abs())
        };
        if times > 32 {
            return None;
        }
        let mut acc = Rational::from_int(1);
        for _ in 0..times {
            acc = acc.checked_mul(&base)?;
        }
        Some(acc)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// A numeric value: exact rational when possible, otherwise a real rounded to
/// six decimal places. Reals are rounded at construction so that structural
/// equality and hashing stay well defined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Number {
    Rational(Rational),
    Real(f64),
}

impl Number {
    pub fn int(n: i64) -> Number {
        Number::Rational(Rational::from_int(n))
    }

    pub fn rational(r: Rational) -> Number {
        Number::Rational(r)
    }

    /// A real value, rounded to six decimals. Non-finite inputs collapse to
    /// zero; the solver filters those out before committal.
    pub fn real(v: f64) -> Number {
        if !v.is_finite() {
            return Number::int(0);
        }
        let r = round6(v);
        Number::Real(r)
    }

    /// Parse "7", "-3/4" or "2.5".
    pub fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        if let Ok(n) = text.parse::<i64>() {
            return Some(Number::int(n));
        }
        if let Some((num, den)) = text.split_once('/') {
            let num = num.trim().parse::<i64>().ok()?;
            let den = den.trim().parse::<i64>().ok()?;
            return Rational::new(num, den).map(Number::Rational);
        }
        text.parse::<f64>().ok().filter(|v| v.is_finite()).map(Number::real)
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Rational(r) => r.to_f64(),
            Number::Real(v) => *v,
        }
    }

    pub fn as_rational(&self) -> Option<Rational> {
        match self {
            Number::Rational(r) => Some(*r),
            Number::Real(_) => None,
        }
    }

    /// Exact integer view, when the value is an integral rational.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Rational(r) if r.is_integer() => Some(r.num()),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Rational(r) => r.is_zero(),
            Number::Real(v) => *v == 0.0,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            Number::Rational(r) => r.is_one(),
            Number::Real(v) => *v == 1.0,
        }
    }

    pub fn add(&self, other: &Number) -> Number {
        if let (Number::Rational(a), Number::Rational(b)) = (self, other) {
            if let Some(r) = a.checked_add(b) {
                return Number::Rational(r);
            }
        }
        Number::real(self.as_f64() + other.as_f64())
    }

    pub fn mul(&self, other: &Number) -> Number {
        if let (Number::Rational(a), Number::Rational(b)) = (self, other) {
            if let Some(r) = a.checked_mul(b) {
                return Number::Rational(r);
            }
        }
        Number::real(self.as_f64() * other.as_f64())
    }

    pub fn neg(&self) -> Number {
        if let Number::Rational(r) = self {
            if let Some(n) = r.checked_neg() {
                return Number::Rational(n);
            }
        }
        Number::real(-self.as_f64())
    }

    pub fn sub(&self, other: &Number) -> Number {
        self.add(&other.neg())
    }

    /// Division; `None` when `other` is zero.
    pub fn div(&self, other: &Number) -> Option<Number> {
        if other.is_zero() {
            return None;
        }
        if let (Number::Rational(a), Number::Rational(b)) = (self, other) {
            if let Some(r) = a.checked_div(b) {
                return Some(Number::Rational(r));
            }
        }
        Some(Number::real(self.as_f64() / other.as_f64()))
    }

    /// Integer power; `None` for `0^-k`.
    pub fn pow_int(&self, exp: i64) -> Option<Number> {
        if self.is_zero() && exp < 0 {
            return None;
        }
        if let Number::Rational(r) = self {
            if let Some(p) = r.checked_pow(exp) {
                return Some(Number::Rational(p));
            }
        }
        Some(Number::real(self.as_f64().powi(exp.clamp(i32::MIN as i64, i32::MAX as i64) as i32)))
    }

    fn key(&self) -> u64 {
        round6(self.as_f64()).to_bits()
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Rational(a), Number::Rational(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Rational(a), Number::Rational(b)) => a.cmp(b),
            _ => round6(self.as_f64())
                .partial_cmp(&round6(other.as_f64()))
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Rational(r) => write!(f, "{}", r),
            Number::Real(v) => write!(f, "{}", v),
        }
    }
}

/// A named algebraic variable. The geometric item a symbol denotes is kept in
/// the Equation sort of the condition store, not on the symbol itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new<S: Into<String>>(name: S) -> Symbol {
        Symbol(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Elementary functions admitted in expressions. Applied to a constant they
/// evaluate numerically; no further identities are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrigFn {
    Sin,
    Cos,
    Tan,
}

impl TrigFn {
    pub fn eval(&self, v: f64) -> f64 {
        match self {
            TrigFn::Sin => v.sin(),
            TrigFn::Cos => v.cos(),
            TrigFn::Tan => v.tan(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrigFn::Sin => "sin",
            TrigFn::Cos => "cos",
            TrigFn::Tan => "tan",
        }
    }
}

/// A symbolic expression in canonical form:
/// - sums carry combined like terms, sorted, with at most one numeric term;
/// - products carry at most one leading numeric coefficient and sorted
///   factors with merged exponents;
/// - a numeric coefficient distributes over a lone sum factor, which makes
///   `a - b` and `-(b - a)` the same value;
/// - functions of constants are evaluated.
///
/// Construct through [`Expr::add`], [`Expr::mul`], [`Expr::pow`],
/// [`Expr::func`] and the arithmetic helpers; never build `Add`/`Mul` nodes
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Expr {
    Num(Number),
    Sym(Symbol),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Func(TrigFn, Box<Expr>),
}

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Num(Number::int(n))
    }

    pub fn num(n: Number) -> Expr {
        Expr::Num(n)
    }

    pub fn sym<S: Into<String>>(name: S) -> Expr {
        Expr::Sym(Symbol::new(name))
    }

    pub fn symbol(sym: Symbol) -> Expr {
        Expr::Sym(sym)
    }

    /// Canonical n-ary sum: flattens, folds constants and combines like terms.
    pub fn add(terms: Vec<Expr>) -> Expr {
        let mut constant = Number::int(0);
        let mut coeffs: BTreeMap<Expr, Number> = BTreeMap::new();

        let mut stack = terms;
        stack.reverse();
        while let Some(term) = stack.pop() {
            match term {
                Expr::Add(inner) => {
                    for t in inner.into_iter().rev() {
                        stack.push(t);
                    }
                }
                Expr::Num(n) => constant = constant.add(&n),
                other => {
                    let (coeff, core) = split_coeff(other);
                    let entry = coeffs.entry(core).or_insert_with(|| Number::int(0));
                    *entry = entry.add(&coeff);
                }
            }
        }

        let mut out: Vec<Expr> = Vec::new();
        for (core, coeff) in coeffs {
            if coeff.is_zero() {
                continue;
            }
            if coeff.is_one() {
                out.push(core);
            } else {
                out.push(attach_coeff(coeff, core));
            }
        }
        if !constant.is_zero() {
            out.push(Expr::Num(constant));
        }
        out.sort();

        match out.len() {
            0 => Expr::int(0),
            1 => out.into_iter().next().unwrap_or_else(|| Expr::int(0)),
            _ => Expr::Add(out),
        }
    }

    /// Canonical n-ary product: flattens, folds the numeric coefficient,
    /// merges exponents of equal bases and distributes the coefficient over a
    /// lone sum factor.
    pub fn mul(factors: Vec<Expr>) -> Expr {
        let mut coeff = Number::int(1);
        let mut powers: BTreeMap<Expr, Vec<Expr>> = BTreeMap::new();

        let mut stack = factors;
        stack.reverse();
        while let Some(factor) = stack.pop() {
            match factor {
                Expr::Mul(inner) => {
                    for t in inner.into_iter().rev() {
                        stack.push(t);
                    }
                }
                Expr::Num(n) => {
                    if n.is_zero() {
                        return Expr::int(0);
                    }
                    coeff = coeff.mul(&n);
                }
                Expr::Pow(base, exp) => powers.entry(*base).or_default().push(*exp),
                other => powers.entry(other).or_default().push(Expr::int(1)),
            }
        }

        let mut out: Vec<Expr> = Vec::new();
        for (base, exps) in powers {
            let exp = Expr::add(exps);
            match exp {
                Expr::Num(n) if n.is_zero() => {}
                Expr::Num(n) if n.is_one() => out.push(base),
                exp => out.push(Expr::pow(base, exp)),
            }
        }

        if out.is_empty() {
            return Expr::Num(coeff);
        }
        if !coeff.is_one() && out.len() == 1 {
            if let Expr::Add(terms) = &out[0] {
                // distribute the numeric coefficient so that -(b - a) and
                // a - b share one canonical form
                let distributed = terms
                    .iter()
                    .map(|t| Expr::mul(vec![Expr::Num(coeff), t.clone()]))
                    .collect();
                return Expr::add(distributed);
            }
        }
        if out.len() == 1 && coeff.is_one() {
            return out.into_iter().next().unwrap_or_else(|| Expr::int(1));
        }

        let mut assembled = Vec::with_capacity(out.len() + 1);
        if !coeff.is_one() {
            assembled.push(Expr::Num(coeff));
        }
        assembled.extend(out);
        if assembled.len() == 1 {
            return assembled.into_iter().next().unwrap_or_else(|| Expr::int(1));
        }
        Expr::Mul(assembled)
    }

    /// Canonical power. `x^1` is `x`, `x^0` is `1`, numeric bases fold under
    /// integer exponents, nested numeric exponents combine.
    pub fn pow(base: Expr, exp: Expr) -> Expr {
        if let Expr::Num(e) = &exp {
            if e.is_one() {
                return base;
            }
            if e.is_zero() {
                return Expr::int(1);
            }
            if let Some(k) = e.as_integer() {
                if let Expr::Num(b) = &base {
                    if let Some(folded) = b.pow_int(k) {
                        return Expr::Num(folded);
                    }
                }
                if let Expr::Pow(inner_base, inner_exp) = &base {
                    if let Expr::Num(ie) = inner_exp.as_ref() {
                        let combined = ie.mul(&Number::int(k));
                        return Expr::pow(inner_base.as_ref().clone(), Expr::Num(combined));
                    }
                }
            }
        }
        Expr::Pow(Box::new(base), Box::new(exp))
    }

    /// Elementary function application; constants evaluate immediately.
    pub fn func(f: TrigFn, arg: Expr) -> Expr {
        if let Expr::Num(n) = &arg {
            return Expr::Num(Number::real(f.eval(n.as_f64())));
        }
        Expr::Func(f, Box::new(arg))
    }

    pub fn neg(e: Expr) -> Expr {
        Expr::mul(vec![Expr::int(-1), e])
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        Expr::add(vec![a, Expr::neg(b)])
    }

    /// `a / b` as `a * b^-1`.
    pub fn divide(a: Expr, b: Expr) -> Expr {
        Expr::mul(vec![a, Expr::pow(b, Expr::int(-1))])
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Expr::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(n) if n.is_zero())
    }

    /// The set of symbols occurring in this expression.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Add(terms) | Expr::Mul(terms) => {
                for t in terms {
                    t.collect_symbols(out);
                }
            }
            Expr::Pow(base, exp) => {
                base.collect_symbols(out);
                exp.collect_symbols(out);
            }
            Expr::Func(_, arg) => arg.collect_symbols(out),
        }
    }

    pub fn contains_symbol(&self, sym: &Symbol) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Sym(s) => s == sym,
            Expr::Add(terms) | Expr::Mul(terms) => terms.iter().any(|t| t.contains_symbol(sym)),
            Expr::Pow(base, exp) => base.contains_symbol(sym) || exp.contains_symbol(sym),
            Expr::Func(_, arg) => arg.contains_symbol(sym),
        }
    }

    /// Pure substitution: every occurrence of `sym` is replaced by `value`
    /// and the result is re-canonicalized.
    pub fn subs(&self, sym: &Symbol, value: &Expr) -> Expr {
        match self {
            Expr::Num(_) => self.clone(),
            Expr::Sym(s) => {
                if s == sym {
                    value.clone()
                } else {
                    self.clone()
                }
            }
            Expr::Add(terms) => Expr::add(terms.iter().map(|t| t.subs(sym, value)).collect()),
            Expr::Mul(terms) => Expr::mul(terms.iter().map(|t| t.subs(sym, value)).collect()),
            Expr::Pow(base, exp) => Expr::pow(base.subs(sym, value), exp.subs(sym, value)),
            Expr::Func(f, arg) => Expr::func(*f, arg.subs(sym, value)),
        }
    }

    /// The canonical-signed form of `self` interpreted as `self = 0`: of the
    /// two equivalent forms `e` and `-e` the smaller one is kept, so adding
    /// an equation and its negation produce the same stored item.
    pub fn canonical_signed(&self) -> Expr {
        let neg = Expr::neg(self.clone());
        if neg < *self { neg } else { self.clone() }
    }
}

/// Split a non-numeric canonical term into (numeric coefficient, core).
fn split_coeff(e: Expr) -> (Number, Expr) {
    if let Expr::Mul(factors) = &e {
        if let Some(Expr::Num(n)) = factors.first() {
            let rest: Vec<Expr> = factors[1..].to_vec();
            let core = if rest.len() == 1 {
                rest.into_iter().next().unwrap_or_else(|| Expr::int(1))
            } else {
                Expr::Mul(rest)
            };
            return (*n, core);
        }
    }
    (Number::int(1), e)
}

/// Reattach a coefficient to a term core without re-canonicalizing the core.
fn attach_coeff(coeff: Number, core: Expr) -> Expr {
    match core {
        Expr::Mul(mut factors) => {
            let mut v = Vec::with_capacity(factors.len() + 1);
            v.push(Expr::Num(coeff));
            v.append(&mut factors);
            Expr::Mul(v)
        }
        other => Expr::Mul(vec![Expr::Num(coeff), other]),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn prec(e: &Expr) -> u8 {
            match e {
                Expr::Add(_) => 1,
                Expr::Mul(_) => 2,
                Expr::Pow(_, _) => 3,
                _ => 4,
            }
        }
        fn go(e: &Expr, parent: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let p = prec(e);
            let parens = p < parent;
            if parens {
                write!(f, "(")?;
            }
            match e {
                Expr::Num(n) => write!(f, "{}", n)?,
                Expr::Sym(s) => write!(f, "{}", s)?,
                Expr::Add(terms) => {
                    for (i, t) in terms.iter().enumerate() {
                        if i > 0 {
                            write!(f, " + ")?;
                        }
                        go(t, p, f)?;
                    }
                }
                Expr::Mul(terms) => {
                    for (i, t) in terms.iter().enumerate() {
                        if i > 0 {
                            write!(f, "*")?;
                        }
                        go(t, p + 1, f)?;
                    }
                }
                Expr::Pow(base, exp) => {
                    go(base, p + 1, f)?;
                    write!(f, "^")?;
                    go(exp, p + 1, f)?;
                }
                Expr::Func(func, arg) => {
                    write!(f, "{}(", func.name())?;
                    go(arg, 0, f)?;
                    write!(f, ")")?;
                }
            }
            if parens {
                write!(f, ")")?;
            }
            Ok(())
        }
        go(self, 0, f)
    }
}
