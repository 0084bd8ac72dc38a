use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// ShutdownHandle stops every server it handed a signal to once it is dropped.
#[derive(Default)]
pub(crate) struct ShutdownHandle {
    senders: Vec<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_signal(&mut self) -> ShutdownSignal {
        let (tx, rx) = oneshot::channel();
        self.senders.push(tx);
        ShutdownSignal { rx }
    }
}

/// Resolves when the owning ShutdownHandle is dropped.
pub(crate) struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Nothing is ever sent, so a ready receiver always means the sender is gone.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
