//! Scenario F from `spec.md` §8: a stress test racing caller cancellation
//! against normal completion, thousands of times, checking the exactly-once
//! release guarantee survives every ordering.
//!
//! Because this crate drives its handle's underlying future only when
//! polled (there is no internal executor — see `crate::handle`), exercising
//! a genuine race between "complete" and "cancel" requires a thread
//! independently polling the handle while another thread cancels it
//! concurrently. The handle is parked behind a `Mutex` so both sides can
//! reach it from separate threads; the `Mutex` only guarantees memory safety
//! for the attempt, not who wins — that is still decided by OS scheduling,
//! which is the race `spec.md` describes.
use {
    bulkhead::{Bulkhead, Listener, Outcome, TerminalKind},
    core::convert::Infallible,
    futures::{channel::oneshot, task::noop_waker},
    std::{
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        task::{Context, Poll},
        thread,
        time::Duration,
    },
};

#[derive(Default)]
struct CountingListener {
    released: AtomicUsize,
}

impl Listener for CountingListener {
    fn on_released(&self, _kind: TerminalKind, _error: Option<&(dyn std::error::Error + 'static)>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// `spec.md` §8 Scenario F, `limit=1`, repeated for many iterations: each
/// iteration admits one operation, then races completing it against
/// cancelling its handle. After every iteration exactly one subsequent
/// submission must be admissible, the one after that must reject, and
/// `on_released` must have fired exactly once for that iteration.
#[test]
fn scenario_f_cancel_vs_complete_race() {
    const ITERATIONS: usize = 5_000;

    for i in 0..ITERATIONS {
        let recorder = Arc::new(CountingListener::default());
        let listener: Arc<dyn Listener> = Arc::clone(&recorder) as Arc<dyn Listener>;
        let bulkhead = Arc::new(Bulkhead::new(1, listener).unwrap());

        let (tx, rx) = oneshot::channel::<Result<u8, Infallible>>();
        let handle = bulkhead.submit(move || async move { rx.await.unwrap_or(Ok(0)) });
        let handle = Arc::new(Mutex::new(handle));

        let completer = {
            let delay = Duration::from_micros((i % 50) as u64);
            thread::spawn(move || {
                thread::sleep(delay);
                let _ = tx.send(Ok(1));
            })
        };

        let canceller = {
            let handle = Arc::clone(&handle);
            let delay = Duration::from_micros(((i * 7) % 50) as u64);
            thread::spawn(move || {
                thread::sleep(delay);
                handle.lock().unwrap().cancel();
            })
        };

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let outcome = loop {
            {
                let mut guard = handle.lock().unwrap();
                if let Poll::Ready(outcome) = Pin::new(&mut *guard).poll(&mut cx) {
                    break outcome;
                }
            }
            thread::yield_now();
        };

        completer.join().unwrap();
        canceller.join().unwrap();

        assert!(
            matches!(outcome, Outcome::Success(_) | Outcome::Cancelled),
            "iteration {i}: unexpected outcome {outcome:?}",
        );
        assert_eq!(
            recorder.released.load(Ordering::SeqCst),
            1,
            "iteration {i}: expected exactly one release",
        );
        assert_eq!(bulkhead.available().unwrap(), 1, "iteration {i}: permit not released");

        let admitted = bulkhead.submit(|| async { Ok::<(), Infallible>(()) });
        assert!(matches!(
            futures::executor::block_on(admitted),
            Outcome::Success(())
        ));

        let (_tx, rx) = oneshot::channel::<Result<(), Infallible>>();
        let held = bulkhead.submit(move || async move { rx.await.unwrap_or(Ok(())) });
        let rejected = bulkhead.submit(|| async { Ok::<(), Infallible>(()) });
        assert!(matches!(
            futures::executor::block_on(rejected),
            Outcome::Failure(bulkhead::BulkheadError::Rejected)
        ));
        drop(held);
    }
}
