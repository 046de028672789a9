//! # Number cruncher: the demo CPU-bound workload.
//!
//! `{number: n}` → `{input, factorial, fibonacci, isPrime}`.
//!
//! Each unit owns one [`NumberCruncher`], so its memo tables are unit-local and survive
//! between tasks. Results are exact (`u128`); inputs whose factorial would overflow are
//! rejected as an ordinary task failure.
//!
//! Inputs above [`MAX_INPUT`] are refused rather than answered with a rounded float:
//! `35!` already exceeds `u128`, and a floating-point factorial stops being exact well
//! before that. Callers get a task failure naming the limit instead of an approximate
//! answer.

use serde::{Deserialize, Serialize};

use crate::pool::TaskHandler;

/// Largest `n` with `n!` representable in `u128`.
pub const MAX_INPUT: u64 = 34;

/// Task payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberTask {
    pub number: u64,
}

/// Task result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberReport {
    pub input: u64,
    pub factorial: u128,
    pub fibonacci: u128,
    pub is_prime: bool,
    /// Name of the unit thread that computed the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
}

/// Memoising handler for [`NumberTask`].
#[derive(Debug)]
pub struct NumberCruncher {
    factorials: Vec<u128>,
    fibs: Vec<u128>,
}

impl Default for NumberCruncher {
    fn default() -> Self {
        Self {
            factorials: vec![1],
            fibs: vec![0, 1],
        }
    }
}

impl NumberCruncher {
    pub fn new() -> Self {
        Self::default()
    }

    fn factorial(&mut self, n: usize) -> u128 {
        while self.factorials.len() <= n {
            let k = self.factorials.len() as u128;
            let prev = self.factorials[self.factorials.len() - 1];
            self.factorials.push(prev * k);
        }
        self.factorials[n]
    }

    fn fibonacci(&mut self, n: usize) -> u128 {
        while self.fibs.len() <= n {
            let len = self.fibs.len();
            self.fibs.push(self.fibs[len - 1] + self.fibs[len - 2]);
        }
        self.fibs[n]
    }

    /// Computes the report for `n`.
    pub fn compute(&mut self, n: u64) -> Result<NumberReport, String> {
        if n > MAX_INPUT {
            return Err(format!("number must be at most {MAX_INPUT}, got {n}"));
        }
        let idx = n as usize;
        Ok(NumberReport {
            input: n,
            factorial: self.factorial(idx),
            fibonacci: self.fibonacci(idx),
            is_prime: is_prime(n),
            thread: std::thread::current().name().map(str::to_owned),
        })
    }
}

impl TaskHandler for NumberCruncher {
    type Task = NumberTask;
    type Output = NumberReport;

    fn handle(&mut self, task: NumberTask) -> Result<NumberReport, String> {
        self.compute(task.number)
    }
}

/// 6k ± 1 trial division.
pub fn is_prime(n: u64) -> bool {
    if n <= 1 {
        return false;
    }
    if n <= 3 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}
