//! Polling of asynchronous fabric operations.

use crate::abort::AbortSignal;
use crate::error::{NetmigError, NetmigResult};
use crate::fabric::Fabric;
use crate::types::{TaskHandle, TaskState};

use std::time::Duration;
use tracing::{debug, warn};

/// How a task is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between two polls
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: None,
        }
    }
}

/// Waits for tasks to reach `success` or `error`. Never retries.
#[derive(Debug, Clone, Default)]
pub struct TaskWaiter {
    policy: WaitPolicy,
    abort: AbortSignal,
}

impl TaskWaiter {
    pub fn new(policy: WaitPolicy) -> Self {
        Self {
            policy,
            abort: AbortSignal::new(),
        }
    }

    /// Stop waiting with an `Interrupted` error once `abort` is raised.
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Block (asynchronously) until `task` is terminal.
    ///
    /// Returns the task's result payload on success, which may be `None`.
    /// A task in the `error` state becomes a `TaskError` carrying the
    /// fabric's message, or `AlreadyExists` for a name collision. An
    /// operator abort ends the wait with `Interrupted`; the task itself
    /// keeps running on the fabric.
    pub async fn wait(
        &self,
        fabric: &dyn Fabric,
        task: &TaskHandle,
    ) -> NetmigResult<Option<serde_json::Value>> {
        tokio::select! {
            biased;
            _ = self.abort.aborted() => {
                warn!(task = %task, "stopped waiting on interrupt");
                Err(NetmigError::interrupted(format!(
                    "Interrupted while waiting for task {task}"
                )))
            }
            result = self.wait_terminal(fabric, task) => result,
        }
    }

    async fn wait_terminal(
        &self,
        fabric: &dyn Fabric,
        task: &TaskHandle,
    ) -> NetmigResult<Option<serde_json::Value>> {
        match self.policy.timeout {
            None => self.poll(fabric, task).await,
            Some(limit) => match tokio::time::timeout(limit, self.poll(fabric, task)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(task = %task, "task did not finish within {:?}", limit);
                    Err(NetmigError::timeout(format!(
                        "Task {task} still pending after {limit:?}"
                    )))
                }
            },
        }
    }

    async fn poll(
        &self,
        fabric: &dyn Fabric,
        task: &TaskHandle,
    ) -> NetmigResult<Option<serde_json::Value>> {
        loop {
            let info = fabric.task_info(task).await?;
            match info.state {
                TaskState::Success => return Ok(info.result),
                TaskState::Error => {
                    let msg = info
                        .error
                        .unwrap_or_else(|| "task failed without a message".to_string());
                    warn!(task = %task, "task failed: {}", msg);
                    if msg.contains("already exists") {
                        return Err(NetmigError::already_exists(msg));
                    }
                    return Err(NetmigError::task(msg));
                }
                TaskState::Queued | TaskState::Running => {
                    debug!(task = %task, state = ?info.state, "task still pending");
                    tokio::time::sleep(self.policy.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetmigErrorKind;
    use crate::simulated::{FabricSnapshot, SimulatedFabric};
    use crate::types::*;

    fn fast() -> TaskWaiter {
        TaskWaiter::new(WaitPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: None,
        })
    }

    fn snapshot() -> FabricSnapshot {
        FabricSnapshot::from_yaml_str(
            r#"
hosts:
  - id: host-1
    name: esx01
    cluster: prod
    vswitches: [vSwitch0]
"#,
        )
        .unwrap()
    }

    fn spec(name: &str) -> HostPortGroupSpec {
        HostPortGroupSpec {
            name: name.into(),
            vswitch_name: "vSwitch0".into(),
            vlan_id: 10,
            num_ports: 1024,
            mtu: 1500,
            security: SecurityPolicy {
                allow_promiscuous: true,
                mac_changes: false,
                forged_transmits: false,
            },
        }
    }

    #[tokio::test]
    async fn waits_through_pending_polls() {
        let fabric = SimulatedFabric::new(snapshot()).with_polls_until_done(3);
        let host = fabric.get_host("host-1").await.unwrap().unwrap();
        let task = fabric.add_port_group(&host, &spec("web")).await.unwrap();

        let result = fast().wait(&fabric, &task).await;
        assert!(result.is_ok());
        assert_eq!(fabric.poll_count(&task).await, 4);
    }

    #[tokio::test]
    async fn error_state_surfaces_message() {
        let fabric = SimulatedFabric::new(snapshot());
        let host = fabric.get_host("host-1").await.unwrap().unwrap();
        fast()
            .wait(&fabric, &fabric.add_port_group(&host, &spec("web")).await.unwrap())
            .await
            .unwrap();

        let task = fabric.add_port_group(&host, &spec("web")).await.unwrap();
        let err = fast().wait(&fabric, &task).await.unwrap_err();
        assert_eq!(err.kind, NetmigErrorKind::AlreadyExists);
        assert!(err.message.contains("already exists"));
    }

    #[tokio::test]
    async fn timeout_policy_stops_a_stuck_task() {
        let fabric = SimulatedFabric::new(snapshot()).with_polls_until_done(u32::MAX);
        let host = fabric.get_host("host-1").await.unwrap().unwrap();
        let task = fabric.add_port_group(&host, &spec("web")).await.unwrap();

        let waiter = TaskWaiter::new(WaitPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Some(Duration::from_millis(30)),
        });
        let err = waiter.wait(&fabric, &task).await.unwrap_err();
        assert_eq!(err.kind, NetmigErrorKind::Timeout);
    }

    #[tokio::test]
    async fn abort_ends_a_wait_without_timeout() {
        let fabric = SimulatedFabric::new(snapshot()).with_polls_until_done(u32::MAX);
        let host = fabric.get_host("host-1").await.unwrap().unwrap();
        let task = fabric.add_port_group(&host, &spec("web")).await.unwrap();
        let abort = AbortSignal::new();
        let trigger = {
            let abort = abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                abort.abort();
            })
        };

        let waiter = fast().with_abort(abort);
        let err = tokio::time::timeout(Duration::from_secs(1), waiter.wait(&fabric, &task))
            .await
            .expect("wait should end after the abort")
            .unwrap_err();
        trigger.await.unwrap();

        assert_eq!(err.kind, NetmigErrorKind::Interrupted);
        assert!(fabric.poll_count(&task).await > 0);
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let fabric = SimulatedFabric::new(snapshot());
        let err = fast()
            .wait(&fabric, &TaskHandle("task-missing".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, NetmigErrorKind::NotFound);
    }
}
