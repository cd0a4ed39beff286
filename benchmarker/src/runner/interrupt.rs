//! External interrupt propagated to every running loop

use tokio::sync::watch;

/// Receiving side, checked by loops at their safe points
#[derive(Debug, Clone)]
pub struct Interrupt {
    signal: watch::Receiver<bool>,
}

/// Sending side, owned by whoever observes the signal
#[derive(Debug)]
pub struct InterruptHandle {
    sender: watch::Sender<bool>,
}

impl Interrupt {
    pub fn channel() -> (InterruptHandle, Interrupt) {
        let (sender, signal) = watch::channel(false);
        (InterruptHandle { sender }, Interrupt { signal })
    }

    /// An interrupt that never fires
    pub fn never() -> Self {
        let (_, interrupt) = Self::channel();
        interrupt
    }

    pub fn is_triggered(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once the interrupt fires
    pub async fn triggered(&self) {
        let mut signal = self.signal.clone();
        let fired = signal.wait_for(|triggered| *triggered).await.is_ok();
        if !fired {
            // sender gone without firing
            std::future::pending::<()>().await;
        }
    }
}

impl InterruptHandle {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}
