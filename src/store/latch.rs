use tokio::sync::watch;

/// One-shot completion latch: a single writer opens it exactly once, any
/// number of readers suspend on it. Dropping the opener without opening also
/// releases waiters, so a dead load task cannot hang queries forever.
pub(crate) fn latch() -> (Opener, Latch) {
    let (tx, rx) = watch::channel(false);
    (Opener(tx), Latch(rx))
}

pub(crate) struct Opener(watch::Sender<bool>);

#[derive(Clone)]
pub(crate) struct Latch(watch::Receiver<bool>);

impl Opener {
    pub(crate) fn open(self) {
        let _ = self.0.send(true);
    }
}

impl Latch {
    pub(crate) async fn wait(&self) {
        let mut rx = self.0.clone();
        let _ = rx.wait_for(|open| *open).await;
    }
}
