//! Capturing callback invocations from tasks the test does not own.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::TestError;

/// Create a connected recorder/recording pair.
///
/// Clone the [`Recorder`] into callbacks; await events on the [`Recording`].
pub fn recorder<T>() -> (Recorder<T>, Recording<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder { tx }, Recording { rx })
}

/// The writing half, cheap to clone into `Fn` callbacks.
#[derive(Debug)]
pub struct Recorder<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Recorder<T> {
    /// Record one event. Never blocks; events after the recording is
    /// dropped are discarded.
    pub fn record(&self, event: T) {
        let _ = self.tx.send(event);
    }
}

/// The reading half, owned by the test.
#[derive(Debug)]
pub struct Recording<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Recording<T> {
    /// Wait up to `within` for the next event.
    pub async fn next(&mut self, within: Duration) -> Result<T, TestError> {
        match timeout(within, self.rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(TestError::Unexpected("all recorders dropped".to_string())),
            Err(_) => Err(TestError::Timeout(within, "recorded event")),
        }
    }

    /// Wait for `count` events, each within `within` of the previous one.
    pub async fn take(&mut self, count: usize, within: Duration) -> Result<Vec<T>, TestError> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(self.next(within).await?);
        }
        Ok(events)
    }

    /// Fail if any event arrives within `window`.
    pub async fn expect_quiet(&mut self, window: Duration) -> Result<(), TestError>
    where
        T: std::fmt::Debug,
    {
        match timeout(window, self.rx.recv()).await {
            Ok(Some(event)) => Err(TestError::Unexpected(format!("{event:?}"))),
            Ok(None) | Err(_) => Ok(()),
        }
    }

    /// Everything recorded so far, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (recorder, mut recording) = recorder();
        let other = recorder.clone();
        tokio::spawn(async move {
            recorder.record(1);
            other.record(2);
        });

        let events = recording.take(2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(events, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_expect_quiet_and_drain() {
        let (recorder, mut recording) = recorder::<&str>();
        tokio_test::assert_ok!(recording.expect_quiet(Duration::from_millis(10)).await);

        recorder.record("late");
        tokio_test::assert_err!(recording.expect_quiet(Duration::from_millis(10)).await);

        recorder.record("a");
        recorder.record("b");
        assert_eq!(recording.drain(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_next_times_out() {
        let (_recorder, mut recording) = recorder::<u8>();
        let err = recording.next(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, TestError::Timeout(_, _)));
    }
}
