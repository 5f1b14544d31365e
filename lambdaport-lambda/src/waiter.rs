//! Settle waiter
//!
//! The provider rejects a mutating call while a previous update is still in
//! progress, so the importer waits between code and configuration updates.

use crate::client::ComputeApi;
use crate::function::SettleState;
use lambdaport_core::{MigrateError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Polling parameters for [`wait_for_function`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Fixed delay between polls
    pub poll_interval: Duration,
    /// Upper bound on the total wait
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Poll `name` until its last update is no longer in progress.
///
/// Returns the number of sleeps taken. A failed update returns
/// [`MigrateError::UpdateFailed`] immediately, `NotFound` propagates, and other
/// remote faults are retried until the timeout elapses.
pub async fn wait_for_function(
    api: &dyn ComputeApi,
    name: &str,
    config: &WaitConfig,
) -> Result<u32> {
    let deadline = Instant::now() + config.timeout;
    let mut sleeps = 0;

    loop {
        match api.get_function_configuration(name).await {
            Ok(status) => match status.settle_state() {
                SettleState::Ready => {
                    debug!(function_name = %name, sleeps, "Function settled");
                    return Ok(sleeps);
                }
                SettleState::Failed(reason) => {
                    return Err(MigrateError::UpdateFailed {
                        function: name.to_string(),
                        reason,
                    });
                }
                SettleState::Pending => {
                    debug!(
                        function_name = %name,
                        status = status.last_update_status.as_str(),
                        "Update in progress"
                    );
                }
            },
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                warn!(function_name = %name, error = %e, "Status poll failed, retrying");
            }
        }

        if Instant::now() + config.poll_interval > deadline {
            return Err(MigrateError::Timeout(format!(
                "{name} did not settle within {}s",
                config.timeout.as_secs()
            )));
        }

        tokio::time::sleep(config.poll_interval).await;
        sleeps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{
        CreateFunctionRequest, FunctionDetails, FunctionStatus, UpdateConfigurationRequest,
        UpdateStatus,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of status responses, repeating the last one
    struct Scripted {
        responses: Mutex<VecDeque<Result<FunctionStatus>>>,
        last: FunctionStatus,
        polls: Mutex<u32>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<FunctionStatus>>, last: FunctionStatus) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last,
                polls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ComputeApi for Scripted {
        async fn get_function(&self, name: &str) -> Result<FunctionDetails> {
            Err(MigrateError::not_found(name))
        }

        async fn get_function_configuration(&self, _name: &str) -> Result<FunctionStatus> {
            *self.polls.lock() += 1;
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(self.last.clone()))
        }

        async fn create_function(&self, _request: &CreateFunctionRequest) -> Result<()> {
            Ok(())
        }

        async fn update_function_code(&self, _name: &str, _code: &Bytes) -> Result<()> {
            Ok(())
        }

        async fn update_function_configuration(
            &self,
            _request: &UpdateConfigurationRequest,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn fast() -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    fn in_progress() -> FunctionStatus {
        FunctionStatus::with_update_status(UpdateStatus::InProgress, None)
    }

    #[tokio::test]
    async fn test_settles_after_two_sleeps() {
        let api = Scripted::new(
            vec![Ok(in_progress()), Ok(in_progress())],
            FunctionStatus::settled(),
        );

        let sleeps = wait_for_function(&api, "f1", &fast()).await.unwrap();
        assert_eq!(sleeps, 2);
        assert_eq!(*api.polls.lock(), 3);
    }

    #[tokio::test]
    async fn test_already_settled_does_not_sleep() {
        let api = Scripted::new(vec![], FunctionStatus::settled());
        assert_eq!(wait_for_function(&api, "f1", &fast()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_update_returns_reason() {
        let api = Scripted::new(
            vec![Ok(FunctionStatus::with_update_status(
                UpdateStatus::Failed,
                Some("InvalidZipFileException"),
            ))],
            FunctionStatus::settled(),
        );

        let err = wait_for_function(&api, "f1", &fast()).await.unwrap_err();
        assert!(matches!(err, MigrateError::UpdateFailed { .. }));
        assert!(err.to_string().contains("InvalidZipFileException"));
        assert_eq!(*api.polls.lock(), 1);
    }

    #[tokio::test]
    async fn test_persistent_in_progress_times_out() {
        let api = Scripted::new(vec![], in_progress());

        let err = wait_for_function(&api, "f1", &fast()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_transient_fault_is_retried() {
        let api = Scripted::new(
            vec![Err(MigrateError::remote("GetFunctionConfiguration", "throttled"))],
            FunctionStatus::settled(),
        );

        assert_eq!(wait_for_function(&api, "f1", &fast()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_not_found_propagates() {
        let api = Scripted::new(
            vec![Err(MigrateError::not_found("function f1"))],
            FunctionStatus::settled(),
        );

        let err = wait_for_function(&api, "f1", &fast()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
