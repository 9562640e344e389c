//! 请求上下文 - 取消与截止时间
//!
//! 每个用例都在调用方提供的上下文中运行；
//! 取消或超时会丢弃进行中的 future，从而中止仓储和协议调用

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ApplicationError;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// 无截止时间的上下文
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 绑定外部取消令牌（通常是服务关闭令牌的子令牌）
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 在上下文中运行 future：取消返回 `Cancelled`，超时返回 `Timeout`
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ApplicationError>
    where
        F: Future<Output = Result<T, ApplicationError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ApplicationError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApplicationError::Cancelled),
            _ = deadline => Err(ApplicationError::Timeout),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = RequestContext::background();
        let value = ctx.run(async { Ok::<_, ApplicationError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let ctx = RequestContext::background();
        ctx.cancel_token().cancel();
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ApplicationError>(())
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ApplicationError>(())
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::Timeout)));
    }
}
