//! # Worker offload for CPU-heavy stages.
//!
//! A [`Worker`] computes one result per value on behalf of a
//! [`map_offload`](crate::Channel::map_offload) stage.
//! [`BlockingWorker`] runs a plain function on tokio's blocking thread pool,
//! sharing a set of static arguments across calls.
//!
//! # Example
//! ```
//! use conflux::{BlockingWorker, Worker};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let worker = BlockingWorker::register(
//!         |salt: &String, v: u32| format!("{salt}:{v}"),
//!         "k".to_string(),
//!     );
//!     assert_eq!(worker.execute(7).await.unwrap(), "k:7");
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StageError, panic_message};

/// Computes one result per value, possibly off the async threads.
#[async_trait]
pub trait Worker<V, U>: Send + Sync + 'static
where
    V: Send + 'static,
    U: Send + 'static,
{
    /// Computes the result for one value.
    async fn execute(&self, value: V) -> Result<U, StageError>;
}

/// Runs `f(&static_args, value)` on the blocking thread pool.
pub struct BlockingWorker<A, F> {
    f: Arc<F>,
    args: Arc<A>,
}

impl<A, F> BlockingWorker<A, F>
where
    A: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    /// Registers `f` with arguments shared by every call.
    pub fn register<V, U>(f: F, static_args: A) -> Arc<Self>
    where
        F: Fn(&A, V) -> U,
    {
        Arc::new(Self {
            f: Arc::new(f),
            args: Arc::new(static_args),
        })
    }
}

#[async_trait]
impl<A, F, V, U> Worker<V, U> for BlockingWorker<A, F>
where
    A: Send + Sync + 'static,
    F: Fn(&A, V) -> U + Send + Sync + 'static,
    V: Send + 'static,
    U: Send + 'static,
{
    async fn execute(&self, value: V) -> Result<U, StageError> {
        let f = Arc::clone(&self.f);
        let args = Arc::clone(&self.args);
        tokio::task::spawn_blocking(move || f(&args, value))
            .await
            .map_err(|join| {
                if join.is_panic() {
                    StageError::Panicked {
                        info: panic_message(&*join.into_panic()),
                    }
                } else {
                    StageError::Canceled
                }
            })
    }
}

impl<A: fmt::Debug, F> fmt::Debug for BlockingWorker<A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingWorker")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_worker_shares_args() {
        let worker =
            BlockingWorker::register(|base: &Vec<u32>, i: usize| base[i] * 2, vec![5, 6, 7]);
        assert_eq!(worker.execute(0).await, Ok(10));
        assert_eq!(worker.execute(2).await, Ok(14));
    }

    #[tokio::test]
    async fn test_blocking_panic_becomes_stage_error() {
        let worker = BlockingWorker::register(
            |_: &(), v: u32| {
                if v == 0 {
                    panic!("division by zero");
                }
                100 / v
            },
            (),
        );
        assert_eq!(
            worker.execute(0).await,
            Err(StageError::Panicked {
                info: "division by zero".into()
            })
        );
        assert_eq!(worker.execute(4).await, Ok(25));
    }
}
