use std::{
    fmt::Display,
    future::Future,
    time::Duration,
};
use tokio::task::JoinSet;

/// Runs all `attempts` concurrently and returns the value of the first one that succeeds.
///
/// Every attempt still running once a winner is found, or once `overall` has elapsed, is aborted.
/// Returns `None` if no attempt succeeded in time.
pub async fn first_success<T, E, F>(attempts: impl IntoIterator<Item = F>, overall: Duration) -> Option<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let mut running = JoinSet::new();
    for attempt in attempts {
        running.spawn(attempt);
    }

    let winner = tokio::time::timeout(overall, async {
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(err)) => debug!(%err, "attempt failed"),
                Err(err) => debug!(%err, "attempt did not complete"),
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    running.abort_all();
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Arc,
        Mutex,
    };
    use tokio::time::sleep;

    #[tokio::test]
    async fn first_to_finish_wins_and_the_rest_are_cancelled() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let attempt = |name: &'static str, delay: u64| {
            let finished = finished.clone();
            async move {
                sleep(Duration::from_millis(delay)).await;
                finished.lock().unwrap().push(name);
                Ok::<_, String>(name)
            }
        };

        let winner = first_success([attempt("slow", 300), attempt("fast", 10)], Duration::from_secs(2)).await;
        assert_eq!(winner, Some("fast"));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(*finished.lock().unwrap(), vec!["fast"]);
    }

    #[tokio::test]
    async fn failures_are_skipped() {
        let attempts: Vec<std::pin::Pin<Box<dyn Future<Output = Result<u16, String>> + Send>>> = vec![
            Box::pin(async { Err("refused".to_string()) }),
            Box::pin(async {
                sleep(Duration::from_millis(20)).await;
                Ok(2)
            }),
        ];
        assert_eq!(first_success(attempts, Duration::from_secs(1)).await, Some(2));
    }

    #[tokio::test]
    async fn nothing_succeeds() {
        let attempts = (0..3).map(|i| async move { Err::<(), _>(format!("attempt {i} refused")) });
        assert_eq!(first_success(attempts, Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn gives_up_after_the_overall_bound() {
        let started = tokio::time::Instant::now();
        let attempts = (0..3).map(|_| async {
            sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(())
        });
        assert_eq!(first_success(attempts, Duration::from_millis(100)).await, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
