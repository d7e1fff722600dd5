use tokio::sync::watch;

/// The position of a [`PauseGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Paused,
    /// Terminal. Workers stop claiming work once they observe it.
    Cancelled,
}

/// Consulted by every worker before it claims an offset.
///
/// Pausing takes effect per target: a worker in the middle of a probe
/// finishes it and only then blocks on the gate.
#[derive(Debug)]
pub struct PauseGate {
    state: watch::Sender<GateState>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Open);
        Self { state }
    }

    /// Blocks until the gate is open or cancelled and reports which.
    pub async fn wait(&self) -> GateState {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| *state != GateState::Paused)
            .await
            .map_or(GateState::Cancelled, |state| *state);
        state
    }

    pub fn pause(&self) {
        self.transition(GateState::Open, GateState::Paused);
    }

    /// Reopens the gate and releases every waiting worker.
    pub fn resume(&self) {
        self.transition(GateState::Paused, GateState::Open);
    }

    pub fn cancel(&self) {
        self.state.send_replace(GateState::Cancelled);
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == GateState::Paused
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == GateState::Cancelled
    }

    fn transition(&self, from: GateState, to: GateState) {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{GateState, PauseGate};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time;

    #[tokio::test]
    async fn open_gate_returns_immediately() {
        let gate = PauseGate::new();
        assert_eq!(gate.wait().await, GateState::Open);
    }

    #[tokio::test]
    async fn paused_gate_blocks_until_resumed() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();
        assert!(gate.is_paused());

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait().await }
        });
        time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        let state = time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, GateState::Open);
    }

    #[tokio::test]
    async fn resume_releases_every_waiter() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();
        time::sleep(Duration::from_millis(20)).await;
        gate.resume();

        for waiter in waiters {
            let state = time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(state, GateState::Open);
        }
    }

    #[tokio::test]
    async fn cancel_releases_paused_waiters_and_sticks() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait().await }
        });
        time::sleep(Duration::from_millis(20)).await;

        gate.cancel();
        assert_eq!(waiter.await.unwrap(), GateState::Cancelled);

        gate.resume();
        gate.pause();
        assert!(gate.is_cancelled());
        assert_eq!(gate.wait().await, GateState::Cancelled);
    }
}
