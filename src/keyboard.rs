use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::router::SignalRouter;

/// Stream of key names as produced by the input device.
pub type KeySource = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Every non-whitespace character typed on stdin is one key press.
pub fn stdin_keys() -> KeySource {
    let lines = BufReader::new(tokio::io::stdin()).lines();
    stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                warn!("Stopped reading keys from stdin: {}", e);
                None
            }
        }
    })
    .flat_map(|line| stream::iter(split_keys(&line)))
    .boxed()
}

/// Keys pushed through a channel, e.g. from another input thread.
pub fn channel_keys(rx: mpsc::Receiver<String>) -> KeySource {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|key| (key, rx)) }).boxed()
}

fn split_keys(line: &str) -> Vec<String> {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect()
}

/// Key listener attached to a router for as long as this guard lives.
///
/// Each key press is routed independently, so a slow acknowledgement does
/// not hold back the next press. Dropping the guard detaches the listener
/// and abandons sends still in flight.
pub struct KeyboardListener {
    task: JoinHandle<()>,
}

impl KeyboardListener {
    pub fn attach(router: Arc<SignalRouter>, mut keys: KeySource) -> Self {
        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    key = keys.next() => match key {
                        Some(key) => {
                            let router = router.clone();
                            in_flight.spawn(async move {
                                router.send(&key).await;
                            });
                        }
                        None => break,
                    },
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }
            while in_flight.join_next().await.is_some() {}
            debug!("Key source exhausted");
        });
        debug!("Keyboard listener attached");
        KeyboardListener { task }
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }

    /// Resolves once the key source has ended and its sends have settled.
    pub async fn wait(&mut self) {
        if !self.task.is_finished() {
            let _ = (&mut self.task).await;
        }
    }
}

impl Drop for KeyboardListener {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Keyboard listener detached");
    }
}
