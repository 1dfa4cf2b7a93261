//! Hand-off of file-system and Parquet work to tokio's blocking pool.

use crate::error::Result;

/// Run `f` on the blocking pool and flatten its result.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;

    #[tokio::test(flavor = "current_thread")]
    async fn work_runs_off_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let worker_thread = run_blocking(|| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker_thread, runtime_thread);
    }

    #[tokio::test]
    async fn errors_and_panics_come_back_as_errors() {
        let err = run_blocking::<_, ()>(|| Err(StrataError::EmptyInput("x.csv".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::EmptyInput(_)));

        let err = run_blocking::<_, ()>(|| panic!("conversion blew up"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Task(_)));
    }
}
