//! Adept-style two-stack tape backing [`crate::Reverse`].
//!
//! Each recorded operation stores the partial derivative of its result with
//! respect to every non-constant operand. The reverse sweep is then a plain
//! multiply-accumulate loop over those multipliers.
//!
//! The projector records all `B` per-example losses of a minibatch on one tape
//! and seeds the `B` outputs at once, so `Jᵗw` costs a single sweep.

use std::cell::Cell;

use crate::Float;

/// Index of a value that was never recorded (a constant).
pub const CONSTANT: u32 = u32::MAX;

/// One recorded operation. Its operand entries occupy
/// `multipliers[prev.end .. self.end]`.
#[derive(Clone, Copy, Debug)]
struct Entry {
    result: u32,
    end: u32,
}

/// Reverse-mode tape.
pub struct Tape<F: Float> {
    entries: Vec<Entry>,
    multipliers: Vec<F>,
    operands: Vec<u32>,
    num_slots: u32,
    num_inputs: u32,
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<F: Float> Tape<F> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tape sized for roughly `est_ops` recorded operations.
    pub fn with_capacity(est_ops: usize) -> Self {
        let mut entries = Vec::with_capacity(est_ops + 1);
        // Sentinel so `entries[i - 1].end` is valid for every real entry.
        entries.push(Entry { result: 0, end: 0 });
        Tape {
            entries,
            multipliers: Vec::with_capacity(est_ops * 2),
            operands: Vec::with_capacity(est_ops * 2),
            num_slots: 0,
            num_inputs: 0,
        }
    }

    /// Register an independent variable and return its slot.
    ///
    /// Inputs must be registered before any operation is recorded so that
    /// they occupy slots `0..num_inputs`.
    #[inline]
    pub fn new_input(&mut self) -> u32 {
        debug_assert_eq!(
            self.num_slots, self.num_inputs,
            "inputs must be registered before recording operations"
        );
        let idx = self.num_slots;
        self.num_slots += 1;
        self.num_inputs += 1;
        idx
    }

    /// Number of registered inputs.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs as usize
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    /// Whether no operation has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn push_operand(&mut self, idx: u32, mult: F) {
        if idx != CONSTANT {
            self.multipliers.push(mult);
            self.operands.push(idx);
        }
    }

    #[inline]
    fn finish(&mut self) -> u32 {
        let result = self.num_slots;
        self.num_slots += 1;
        self.entries.push(Entry {
            result,
            end: self.multipliers.len() as u32,
        });
        result
    }

    /// Record `result = f(operand)` with `mult = df/d(operand)`.
    #[inline]
    pub fn push_unary(&mut self, operand: u32, mult: F) -> u32 {
        self.push_operand(operand, mult);
        self.finish()
    }

    /// Record `result = f(lhs, rhs)` with both partial derivatives.
    #[inline]
    pub fn push_binary(&mut self, lhs: u32, lhs_mult: F, rhs: u32, rhs_mult: F) -> u32 {
        self.push_operand(lhs, lhs_mult);
        self.push_operand(rhs, rhs_mult);
        self.finish()
    }

    /// Reverse sweep seeded with `(slot, adjoint)` pairs.
    ///
    /// Seeds on the same slot accumulate. Returns the adjoints of the inputs
    /// only, in registration order.
    pub fn reverse_seeded(&self, seeds: &[(u32, F)]) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.num_slots as usize];
        for &(idx, seed) in seeds {
            if idx != CONSTANT {
                adjoints[idx as usize] = adjoints[idx as usize] + seed;
            }
        }

        for i in (1..self.entries.len()).rev() {
            let entry = self.entries[i];
            let a = adjoints[entry.result as usize];
            if a == F::zero() {
                continue;
            }
            let start = self.entries[i - 1].end as usize;
            for j in start..entry.end as usize {
                let k = self.operands[j] as usize;
                adjoints[k] = adjoints[k] + self.multipliers[j] * a;
            }
        }

        adjoints.truncate(self.num_inputs as usize);
        adjoints
    }
}

thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local active-tape slot for a float type.
pub trait TapeThreadLocal: Float {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f32 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeThreadLocal for f64 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Run `f` against this thread's active tape.
///
/// # Panics
///
/// Panics if no tape is active on the current thread.
#[inline]
pub fn with_active_tape<F: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no active tape; reverse-mode values must be created through alterproj::vjp or a TapeGuard"
        );
        // SAFETY: a non-null pointer was installed by a live TapeGuard, which
        // holds the unique `&mut Tape` for its whole scope. The cell is
        // thread-local, so no other thread can observe it.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard installing a tape as the thread's active tape and restoring the
/// previous one on drop.
pub struct TapeGuard<F: TapeThreadLocal> {
    prev: *mut Tape<F>,
}

impl<F: TapeThreadLocal> TapeGuard<F> {
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::cell().with(|cell| cell.replace(tape as *mut Tape<F>));
        TapeGuard { prev }
    }
}

impl<F: TapeThreadLocal> Drop for TapeGuard<F> {
    fn drop(&mut self) {
        F::cell().with(|cell| cell.set(self.prev));
    }
}
