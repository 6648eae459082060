use std::collections::HashSet;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{CameraSource, SourceId};

/// Blocking reachability check. Implementations must bound their own wait.
pub trait Probe: Send + Sync {
    fn probe(&self, id: &SourceId) -> bool;
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub candidate: CameraSource,
    pub reachable: bool,
}

pub struct Prober {
    runtime: Handle,
    probe: Arc<dyn Probe>,
    tx: mpsc::UnboundedSender<ProbeResult>,
    rx: mpsc::UnboundedReceiver<ProbeResult>,
    scheduled: HashSet<SourceId>,
    pending: usize,
}

impl Prober {
    pub fn new(runtime: Handle, probe: Arc<dyn Probe>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            probe,
            tx,
            rx,
            scheduled: HashSet::new(),
            pending: 0,
        }
    }

    /// Starts a probe for `candidate`. Each candidate is probed at most once;
    /// returns `false` for a repeat.
    pub fn schedule(&mut self, candidate: CameraSource) -> bool {
        if !self.scheduled.insert(candidate.id.clone()) {
            return false;
        }
        log::info!("probing {}", candidate.id);
        self.pending += 1;
        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let reachable = probe.probe(&candidate.id);
            let _ = tx.send(ProbeResult {
                candidate,
                reachable,
            });
        });
        true
    }

    /// Non-blocking: the next finished probe, if any.
    pub fn try_next(&mut self) -> Option<ProbeResult> {
        let result = self.rx.try_recv().ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(result)
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for, ScriptedProbe};

    #[test]
    fn result_arrives_on_the_caller_side() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let probe = Arc::new(ScriptedProbe::reachable(true));
        let mut prober = Prober::new(runtime.handle().clone(), probe.clone());

        let cam = CameraSource::network("rtsp://10.0.0.9/live", "Yard");
        assert!(prober.schedule(cam.clone()));
        assert_eq!(prober.pending(), 1);

        let result = wait_for(|| prober.try_next()).expect("probe result");
        assert_eq!(result.candidate, cam);
        assert!(result.reachable);
        assert_eq!(prober.pending(), 0);
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn candidate_is_probed_once() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let probe = Arc::new(ScriptedProbe::reachable(false));
        let mut prober = Prober::new(runtime.handle().clone(), probe.clone());

        let cam = CameraSource::network("rtsp://10.0.0.9/live", "Yard");
        assert!(prober.schedule(cam.clone()));
        assert!(!prober.schedule(cam));

        let result = wait_for(|| prober.try_next()).expect("probe result");
        assert!(!result.reachable);
        assert_eq!(probe.calls(), 1);
    }
}
