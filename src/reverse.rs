use std::fmt::{self, Display};

use crate::tape::{self, TapeThreadLocal, CONSTANT};
use crate::Float;

/// Reverse-mode AD variable.
///
/// A value and a slot on the thread's active tape. `Copy` because the tape
/// lives in a thread-local rather than inside the variable.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
}

impl<F: Float> Reverse<F> {
    /// A constant, never recorded on the tape.
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Wrap an already-allocated tape slot.
    #[inline]
    pub fn from_tape(value: F, index: u32) -> Self {
        Reverse { value, index }
    }

    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}

/// Record a unary result. Constant operands produce constant results, which
/// keeps the tape free of dead entries.
#[inline]
pub(crate) fn rev_unary<F: TapeThreadLocal>(x: Reverse<F>, value: F, deriv: F) -> Reverse<F> {
    if x.index == CONSTANT {
        return Reverse::constant(value);
    }
    let index = tape::with_active_tape(|t| t.push_unary(x.index, deriv));
    Reverse { value, index }
}

#[inline]
pub(crate) fn rev_binary<F: TapeThreadLocal>(
    a: Reverse<F>,
    da: F,
    b: Reverse<F>,
    db: F,
    value: F,
) -> Reverse<F> {
    if a.index == CONSTANT && b.index == CONSTANT {
        return Reverse::constant(value);
    }
    let index = tape::with_active_tape(|t| t.push_binary(a.index, da, b.index, db));
    Reverse { value, index }
}

impl<F: TapeThreadLocal> Reverse<F> {
    #[inline]
    pub fn recip(self) -> Self {
        let inv = F::one() / self.value;
        rev_unary(self, inv, -inv * inv)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        rev_unary(self, s, F::one() / (s + s))
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let deriv = match F::from_i32(n) {
            Some(nf) => nf * self.value.powi(n - 1),
            None => F::nan(),
        };
        rev_unary(self, self.value.powi(n), deriv)
    }

    #[inline]
    pub fn exp(self) -> Self {
        let e = self.value.exp();
        rev_unary(self, e, e)
    }

    #[inline]
    pub fn ln(self) -> Self {
        rev_unary(self, self.value.ln(), F::one() / self.value)
    }

    #[inline]
    pub fn ln_1p(self) -> Self {
        rev_unary(self, self.value.ln_1p(), F::one() / (F::one() + self.value))
    }

    #[inline]
    pub fn tanh(self) -> Self {
        let t = self.value.tanh();
        rev_unary(self, t, F::one() - t * t)
    }

    #[inline]
    pub fn sin(self) -> Self {
        rev_unary(self, self.value.sin(), self.value.cos())
    }

    #[inline]
    pub fn cos(self) -> Self {
        rev_unary(self, self.value.cos(), -self.value.sin())
    }

    #[inline]
    pub fn abs(self) -> Self {
        rev_unary(self, self.value.abs(), self.value.signum())
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.value >= other.value {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.value <= other.value {
            self
        } else {
            other
        }
    }
}
