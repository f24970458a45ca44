//! Sample Workloads
//!
//! CPU-bound placeholders run by the two families. Both poll the cancel
//! token between chunks of work and give up with `Interrupted` once cancelled.

use rand::Rng;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::WorkloadError;
use crate::tasks::{CancelToken, Family};

/// Workload run for one task, given the caller's integer input
pub type Workload = Arc<dyn Fn(i64, &CancelToken) -> Result<i64, WorkloadError> + Send + Sync>;

/// Upper bound on generated list lengths
pub const MAX_LIST_LEN: i64 = 50_000_000;

const POLL_EVERY: usize = 4096;

/// Default workload of a family, scaled per `config`
pub fn for_family(family: Family, config: &EngineConfig) -> Workload {
    match family {
        Family::A => {
            let scale = config.scale_a;
            Arc::new(move |input: i64, token: &CancelToken| {
                fibonacci_sorted_max(input.saturating_mul(scale), token)
            })
        }
        Family::B => {
            let scale = config.scale_b;
            Arc::new(move |input: i64, token: &CancelToken| {
                bubble_sort_last(input.saturating_mul(scale), token)
            })
        }
    }
}

/// `fib(n)` with `fib(1) = fib(2) = 1`
pub fn fibonacci(n: u32) -> i64 {
    let (mut prev, mut curr) = (0i64, 1i64);
    for _ in 1..n {
        let next = prev.saturating_add(curr);
        prev = curr;
        curr = next;
    }
    curr
}

/// Draw `len` integers in `[1, 10)`, map each to its Fibonacci number, sort,
/// and return the largest.
pub fn fibonacci_sorted_max(len: i64, token: &CancelToken) -> Result<i64, WorkloadError> {
    if len > MAX_LIST_LEN {
        return Err(WorkloadError::TooLarge { size: len });
    }
    if len <= 0 {
        return Err(WorkloadError::EmptyList);
    }

    let mut rng = rand::rng();
    let mut values = Vec::with_capacity(len as usize);
    for i in 0..len as usize {
        if i % POLL_EVERY == 0 {
            token.check()?;
        }
        values.push(fibonacci(rng.random_range(1..10)));
    }

    token.check()?;
    values.sort_unstable();
    values.last().copied().ok_or(WorkloadError::EmptyList)
}

/// Draw `size` integers in `[1, size)`, bubble-sort them, and return the last.
pub fn bubble_sort_last(size: i64, token: &CancelToken) -> Result<i64, WorkloadError> {
    if size > MAX_LIST_LEN {
        return Err(WorkloadError::TooLarge { size });
    }
    if size <= 1 {
        return Err(WorkloadError::EmptyRange { size });
    }

    let mut rng = rand::rng();
    let mut values: Vec<i64> = (0..size).map(|_| rng.random_range(1..size)).collect();
    bubble_sort(&mut values, token)?;
    values.last().copied().ok_or(WorkloadError::EmptyRange { size })
}

fn bubble_sort(values: &mut [i64], token: &CancelToken) -> Result<(), WorkloadError> {
    let n = values.len();
    for i in 0..n.saturating_sub(1) {
        token.check()?;
        for j in 0..n - i - 1 {
            if values[j] > values[j + 1] {
                values.swap(j, j + 1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskHandle;

    fn live_token() -> CancelToken {
        TaskHandle::new(Family::A, 0).token()
    }

    #[test]
    fn test_fibonacci() {
        let seq: Vec<i64> = (1..10).map(fibonacci).collect();
        assert_eq!(seq, vec![1, 1, 2, 3, 5, 8, 13, 21, 34]);
    }

    #[test]
    fn test_fibonacci_sorted_max_in_range() {
        let max = fibonacci_sorted_max(500, &live_token()).unwrap();
        assert!((1..=34).contains(&max));
    }

    #[test]
    fn test_fibonacci_empty() {
        assert_eq!(
            fibonacci_sorted_max(0, &live_token()),
            Err(WorkloadError::EmptyList)
        );
        assert_eq!(
            fibonacci_sorted_max(-3, &live_token()),
            Err(WorkloadError::EmptyList)
        );
    }

    #[test]
    fn test_bubble_sort_sorts() {
        let mut values = vec![5, 3, 9, 1, 1, 4];
        bubble_sort(&mut values, &live_token()).unwrap();
        assert_eq!(values, vec![1, 1, 3, 4, 5, 9]);
    }

    #[test]
    fn test_bubble_sort_last_is_max_of_range() {
        let last = bubble_sort_last(200, &live_token()).unwrap();
        assert!((1..200).contains(&last));
    }

    #[test]
    fn test_bubble_sort_empty_range() {
        assert_eq!(
            bubble_sort_last(1, &live_token()),
            Err(WorkloadError::EmptyRange { size: 1 })
        );
        assert_eq!(
            bubble_sort_last(0, &live_token()),
            Err(WorkloadError::EmptyRange { size: 0 })
        );
    }

    #[test]
    fn test_cancelled_token_interrupts() {
        let handle = TaskHandle::new(Family::B, 0);
        handle.cancel();
        assert_eq!(
            bubble_sort_last(1000, &handle.token()),
            Err(WorkloadError::Interrupted)
        );
        assert_eq!(
            fibonacci_sorted_max(1000, &handle.token()),
            Err(WorkloadError::Interrupted)
        );
    }

    #[test]
    fn test_scaled_family_workloads() {
        let config = EngineConfig::default().with_scales(10, 10);
        let a = for_family(Family::A, &config);
        let b = for_family(Family::B, &config);
        assert!(a(3, &live_token()).is_ok());
        assert!(b(5, &live_token()).is_ok());
        assert_eq!(b(0, &live_token()), Err(WorkloadError::EmptyRange { size: 0 }));
        assert_eq!(
            a(i64::MAX, &live_token()),
            Err(WorkloadError::TooLarge { size: i64::MAX })
        );
    }
}
