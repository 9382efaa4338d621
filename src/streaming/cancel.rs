//! 复合取消信号
//!
//! 把调用方的取消令牌与内部超时合并为单一的有效令牌。
//! 两个来源任一触发都会取消有效令牌，且只会触发一次；
//! 触发原因被记录下来，用于区分静默取消与超时失败。

use crate::streaming::error::AuditStreamError;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 有效令牌被触发的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// 内部超时
    Timeout,
    /// 调用方取消
    Caller,
}

/// 复合取消
///
/// 创建时启动一个后台监视任务；对象被丢弃时监视任务随之结束，
/// 不会遗留悬挂的定时器。
#[derive(Debug)]
pub struct CompositeCancellation {
    effective: CancellationToken,
    reason: Arc<OnceCell<CancelReason>>,
    disarm: CancellationToken,
    done: CancellationToken,
    timeout: Duration,
}

impl CompositeCancellation {
    /// 启动超时计时并关联调用方令牌
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn arm(timeout: Duration, caller: Option<CancellationToken>) -> Self {
        let effective = CancellationToken::new();
        let reason = Arc::new(OnceCell::new());
        let disarm = CancellationToken::new();
        let done = CancellationToken::new();

        tokio::spawn(watch(
            timeout,
            caller.unwrap_or_default(),
            effective.clone(),
            reason.clone(),
            disarm.clone(),
            done.clone(),
        ));

        Self {
            effective,
            reason,
            disarm,
            done,
            timeout,
        }
    }

    /// 有效令牌
    pub fn token(&self) -> &CancellationToken {
        &self.effective
    }

    pub fn is_cancelled(&self) -> bool {
        self.effective.is_cancelled()
    }

    /// 触发原因（尚未触发时为 None）
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 解除超时计时（收到响应头后调用），调用方取消仍然有效
    pub fn disarm_timeout(&self) {
        self.disarm.cancel();
    }

    /// 有效令牌触发后应当上报的错误
    pub fn cancellation_error(&self) -> AuditStreamError {
        match self.reason() {
            Some(CancelReason::Timeout) => AuditStreamError::Timeout {
                seconds: self.timeout.as_secs(),
            },
            Some(CancelReason::Caller) | None => AuditStreamError::Cancelled,
        }
    }

    /// 对网络失败分类
    ///
    /// 有效令牌已因超时触发时报告超时，因调用方触发时报告取消，
    /// 否则原样返回。
    pub fn classify(&self, err: AuditStreamError) -> AuditStreamError {
        match self.reason() {
            Some(_) => self.cancellation_error(),
            None => err,
        }
    }
}

impl Drop for CompositeCancellation {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

fn fire(effective: &CancellationToken, reason: &OnceCell<CancelReason>, why: CancelReason) {
    if reason.set(why).is_ok() {
        debug!(reason = ?why, "审计请求已取消");
        effective.cancel();
    }
}

async fn watch(
    timeout: Duration,
    caller: CancellationToken,
    effective: CancellationToken,
    reason: Arc<OnceCell<CancelReason>>,
    disarm: CancellationToken,
    done: CancellationToken,
) {
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    let mut armed = true;

    loop {
        tokio::select! {
            biased;
            _ = done.cancelled() => return,
            _ = caller.cancelled() => {
                fire(&effective, &reason, CancelReason::Caller);
                return;
            }
            _ = disarm.cancelled(), if armed => {
                armed = false;
            }
            _ = &mut sleep, if armed => {
                fire(&effective, &reason, CancelReason::Timeout);
                return;
            }
        }
    }
}
