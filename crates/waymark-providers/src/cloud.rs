use std::sync::{Arc, Mutex};

use log::debug;
use waymark_core::contracts::{
    CancellationToken, CloudAnchorService, HostCompletion, Pose, ResolveCompletion,
};

/// How the scripted service answers the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Complete successfully before the call returns.
    Succeed,
    /// Report failure before the call returns.
    Fail,
    /// Hold the completion until the test releases it (or never).
    Pending,
}

#[derive(Debug, Default)]
struct Inner {
    host_outcome: Option<ScriptedOutcome>,
    resolve_outcome: Option<ScriptedOutcome>,
    resolve_pose: Pose,
    pending_hosts: Vec<(HostCompletion, CancellationToken)>,
    pending_resolves: Vec<(ResolveCompletion, CancellationToken)>,
    hosted_count: u64,
    last_cancel: Option<CancellationToken>,
}

/// Cloud anchor service with scripted outcomes. `Pending` requests are
/// parked and can be released late, which is how the session's stale-
/// completion suppression gets exercised.
#[derive(Debug, Clone)]
pub struct ScriptedCloudAnchors {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedCloudAnchors {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                host_outcome: Some(ScriptedOutcome::Succeed),
                resolve_outcome: Some(ScriptedOutcome::Succeed),
                resolve_pose: Pose::identity(),
                ..Inner::default()
            })),
        }
    }

    pub fn set_host_outcome(&self, outcome: ScriptedOutcome) {
        self.inner.lock().expect("cloud lock").host_outcome = Some(outcome);
    }

    pub fn set_resolve_outcome(&self, outcome: ScriptedOutcome) {
        self.inner.lock().expect("cloud lock").resolve_outcome = Some(outcome);
    }

    /// Pose reported for successful resolves.
    pub fn set_resolve_pose(&self, pose: Pose) {
        self.inner.lock().expect("cloud lock").resolve_pose = pose;
    }

    pub fn pending_host_count(&self) -> usize {
        self.inner.lock().expect("cloud lock").pending_hosts.len()
    }

    pub fn pending_resolve_count(&self) -> usize {
        self.inner.lock().expect("cloud lock").pending_resolves.len()
    }

    /// Token passed with the most recent request, for cancellation checks.
    pub fn last_cancel_token(&self) -> Option<CancellationToken> {
        self.inner.lock().expect("cloud lock").last_cancel.clone()
    }

    /// Releases the oldest parked host request. Fires even if the session
    /// has since cancelled: real cloud callbacks do not check first either.
    pub fn release_next_host(&self, success: bool) {
        let entry = {
            let mut inner = self.inner.lock().expect("cloud lock");
            if inner.pending_hosts.is_empty() {
                None
            } else {
                inner.hosted_count += 1;
                let id = inner.hosted_count;
                Some((inner.pending_hosts.remove(0), id))
            }
        };
        if let Some(((completion, _cancel), id)) = entry {
            if success {
                completion.succeed(format!("scripted-cloud-{id}"));
            } else {
                completion.fail();
            }
        }
    }

    pub fn release_next_resolve(&self, success: bool) {
        let entry = {
            let mut inner = self.inner.lock().expect("cloud lock");
            if inner.pending_resolves.is_empty() {
                None
            } else {
                let pose = inner.resolve_pose;
                Some((inner.pending_resolves.remove(0), pose))
            }
        };
        if let Some(((completion, _cancel), pose)) = entry {
            if success {
                completion.succeed(pose);
            } else {
                completion.fail();
            }
        }
    }
}

impl Default for ScriptedCloudAnchors {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudAnchorService for ScriptedCloudAnchors {
    fn host(
        &mut self,
        _local_pose: Pose,
        ttl_days: u32,
        completion: HostCompletion,
        cancel: CancellationToken,
    ) {
        let mut inner = self.inner.lock().expect("cloud lock");
        inner.last_cancel = Some(cancel.clone());
        let outcome = inner.host_outcome.unwrap_or(ScriptedOutcome::Succeed);
        debug!(target: "waymark_providers::cloud", "host request (ttl {ttl_days}d): {outcome:?}");
        match outcome {
            ScriptedOutcome::Succeed => {
                inner.hosted_count += 1;
                let id = inner.hosted_count;
                drop(inner);
                completion.succeed(format!("scripted-cloud-{id}"));
            }
            ScriptedOutcome::Fail => {
                drop(inner);
                completion.fail();
            }
            ScriptedOutcome::Pending => {
                inner.pending_hosts.push((completion, cancel));
            }
        }
    }

    fn resolve(
        &mut self,
        cloud_anchor_id: &str,
        completion: ResolveCompletion,
        cancel: CancellationToken,
    ) {
        let mut inner = self.inner.lock().expect("cloud lock");
        inner.last_cancel = Some(cancel.clone());
        let outcome = inner.resolve_outcome.unwrap_or(ScriptedOutcome::Succeed);
        debug!(target: "waymark_providers::cloud", "resolve request for {cloud_anchor_id}: {outcome:?}");
        match outcome {
            ScriptedOutcome::Succeed => {
                let pose = inner.resolve_pose;
                drop(inner);
                completion.succeed(pose);
            }
            ScriptedOutcome::Fail => {
                drop(inner);
                completion.fail();
            }
            ScriptedOutcome::Pending => {
                inner.pending_resolves.push((completion, cancel));
            }
        }
    }
}
