use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio::time::Instant;

use super::*;

fn fast_limiter() -> Arc<dyn RateLimiter<String>> {
    Arc::new(ItemExponentialFailureRateLimiter::new(
        Duration::from_millis(1),
        Duration::from_millis(500),
    ))
}

async fn get_within(
    queue: &RateLimitingQueue<String>,
    limit: Duration,
) -> String {
    timeout(limit, queue.get())
        .await
        .expect("get timed out")
        .expect("queue unexpectedly shut down")
}

#[tokio::test]
async fn test_add_rate_limited_delivers_after_backoff() {
    let queue = RateLimitingQueue::new(fast_limiter());
    queue.add_rate_limited("x".to_string());
    assert_eq!(queue.num_requeues(&"x".to_string()), 1);
    assert_eq!(get_within(&queue, Duration::from_secs(2)).await, "x");
    queue.done("x".to_string());
}

#[tokio::test]
async fn test_backoff_grows_until_forget() {
    let queue = RateLimitingQueue::new(fast_limiter());
    for _ in 0..4 {
        queue.add_rate_limited("x".to_string());
        let got = get_within(&queue, Duration::from_secs(2)).await;
        queue.done(got);
    }
    assert_eq!(queue.num_requeues(&"x".to_string()), 4);

    // Forget clears the limiter only; the queue itself is untouched.
    queue.forget(&"x".to_string());
    assert_eq!(queue.num_requeues(&"x".to_string()), 0);
}

#[tokio::test]
async fn test_failing_worker_loop_converges() {
    let queue = RateLimitingQueue::new(fast_limiter());
    queue.add("job".to_string());

    // Fail twice, then succeed: the canonical worker shape.
    let mut attempts = 0;
    while let Some(item) = {
        match timeout(Duration::from_secs(2), queue.get()).await {
            Ok(item) => item,
            Err(_) => panic!("worker starved"),
        }
    } {
        attempts += 1;
        if attempts < 3 {
            queue.add_rate_limited(item.clone());
        } else {
            queue.forget(&item);
            queue.done(item);
            break;
        }
        queue.done(item);
    }
    assert_eq!(attempts, 3);
    assert_eq!(queue.num_requeues(&"job".to_string()), 0);
}

#[tokio::test]
async fn test_direct_add_skips_the_limiter() {
    let queue = RateLimitingQueue::new(Arc::new(ItemExponentialFailureRateLimiter::new(
        Duration::from_secs(5),
        Duration::from_secs(60),
    )));
    let started = Instant::now();
    queue.add("x".to_string());
    assert_eq!(get_within(&queue, Duration::from_millis(200)).await, "x");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(queue.num_requeues(&"x".to_string()), 0);
}

#[tokio::test]
async fn test_shutdown_propagates() {
    let queue = RateLimitingQueue::new(fast_limiter());
    queue.shut_down();
    assert!(queue.shutting_down());
    assert_eq!(queue.get().await, None);
}
