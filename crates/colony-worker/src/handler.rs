use colony_core::{Attribute, Result, TaskAssignment, WorkerError};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Attribute carrying N for the Fibonacci handler.
pub const FIBONACCI_PARAMETER: &str = "fibonacciNum";

/// Default key of the published result attribute.
pub const RESULT_KEY: &str = "result";

/// Largest N accepted unless configured otherwise. F(1_000_000) has about
/// 209k digits.
pub const DEFAULT_MAX_N: u64 = 1_000_000;

/// Unit of work selected by a parameter key on the assignment.
///
/// `handle` is synchronous and may be CPU heavy; the executor runs it on
/// the blocking pool.
pub trait TaskHandler: Send + Sync {
    /// Attribute key this handler recognizes.
    fn parameter_key(&self) -> &str;

    /// Key of the outbound attribute carrying the result.
    fn result_key(&self) -> &str {
        RESULT_KEY
    }

    fn handle(&self, value: &str) -> Result<String>;
}

/// Handlers indexed by the parameter key they recognize.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .insert(handler.parameter_key().to_string(), Arc::new(handler));
    }

    pub fn has_handler(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn parameter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// First inbound attribute with a registered key, and its handler.
    pub fn find<'a>(
        &self,
        assignment: &'a TaskAssignment,
    ) -> Option<(Arc<dyn TaskHandler>, &'a Attribute)> {
        assignment.inputs().find_map(|attribute| {
            self.handlers
                .get(&attribute.key)
                .map(|handler| (handler.clone(), attribute))
        })
    }
}

/// How the computed term is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    /// Number of decimal digits of the term
    #[default]
    Digits,
    /// The term itself, in decimal
    Term,
}

impl FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digits" => Ok(ResultFormat::Digits),
            "term" => Ok(ResultFormat::Term),
            other => Err(format!("unknown result format {:?} (expected digits or term)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FibonacciMethod {
    #[default]
    Iterative,
    Doubling,
}

impl FromStr for FibonacciMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iterative" => Ok(FibonacciMethod::Iterative),
            "doubling" => Ok(FibonacciMethod::Doubling),
            other => Err(format!(
                "unknown fibonacci method {:?} (expected iterative or doubling)",
                other
            )),
        }
    }
}

/// N-th term of the sequence by repeated addition.
pub fn fibonacci(n: u64) -> BigUint {
    let mut current = BigUint::from(0u8);
    let mut next = BigUint::from(1u8);
    for _ in 0..n {
        let sum = &current + &next;
        current = std::mem::replace(&mut next, sum);
    }
    current
}

/// N-th term by fast doubling:
/// F(2k) = F(k) * (2F(k+1) - F(k)), F(2k+1) = F(k)^2 + F(k+1)^2.
pub fn fibonacci_doubling(n: u64) -> BigUint {
    let mut a = BigUint::from(0u8);
    let mut b = BigUint::from(1u8);

    for bit in (0..u64::BITS - n.leading_zeros()).rev() {
        let twice_b = &b + &b;
        let even = &a * (&twice_b - &a);
        let odd = &a * &a + &b * &b;

        if (n >> bit) & 1 == 0 {
            a = even;
            b = odd;
        } else {
            b = &even + &odd;
            a = odd;
        }
    }
    a
}

pub struct FibonacciHandler {
    method: FibonacciMethod,
    format: ResultFormat,
    max_n: u64,
}

impl FibonacciHandler {
    pub fn new(method: FibonacciMethod, format: ResultFormat) -> Self {
        FibonacciHandler {
            method,
            format,
            max_n: DEFAULT_MAX_N,
        }
    }

    /// Reject N above `max_n` before any computation starts. A running
    /// computation cannot be interrupted.
    pub fn with_max_n(mut self, max_n: u64) -> Self {
        self.max_n = max_n;
        self
    }

    pub fn term(&self, n: u64) -> BigUint {
        match self.method {
            FibonacciMethod::Iterative => fibonacci(n),
            FibonacciMethod::Doubling => fibonacci_doubling(n),
        }
    }
}

impl Default for FibonacciHandler {
    fn default() -> Self {
        FibonacciHandler::new(FibonacciMethod::default(), ResultFormat::default())
    }
}

impl TaskHandler for FibonacciHandler {
    fn parameter_key(&self) -> &str {
        FIBONACCI_PARAMETER
    }

    fn handle(&self, value: &str) -> Result<String> {
        let invalid = |reason: String| WorkerError::TaskParameterInvalid {
            key: FIBONACCI_PARAMETER.to_string(),
            value: value.to_string(),
            reason,
        };

        let n: u64 = value
            .trim()
            .parse()
            .map_err(|e| invalid(format!("expected a non-negative integer: {}", e)))?;
        if n > self.max_n {
            return Err(invalid(format!("exceeds the maximum of {}", self.max_n)));
        }

        let term = self.term(n).to_string();
        Ok(match self.format {
            ResultFormat::Digits => term.len().to_string(),
            ResultFormat::Term => term,
        })
    }
}
