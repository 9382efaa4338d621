//! 审计会话登记
//!
//! 每个品牌同一时间只保留一次运行：开始新的运行会取消同一品牌上一次的运行，
//! 旧运行结束时不会误删新运行的登记。

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 一次登记的运行
#[derive(Debug, Clone)]
pub struct AuditSession {
    subject: String,
    id: u64,
    token: CancellationToken,
}

impl AuditSession {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// 传给 `run_audit` 的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 会话登记表
#[derive(Debug, Default)]
pub struct AuditSessionRegistry {
    sessions: DashMap<String, (u64, CancellationToken)>,
    next_id: AtomicU64,
}

impl AuditSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次新运行，并取消同一品牌的上一次运行
    pub fn begin(&self, subject: &str) -> AuditSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        if let Some((previous_id, previous)) = self
            .sessions
            .insert(subject.to_string(), (id, token.clone()))
        {
            info!(subject = %subject, previous_id, "取消同一品牌的上一次审计");
            previous.cancel();
        }

        AuditSession {
            subject: subject.to_string(),
            id,
            token,
        }
    }

    /// 运行结束后注销；只删除与该会话匹配的登记
    pub fn finish(&self, session: &AuditSession) -> bool {
        self.sessions
            .remove_if(&session.subject, |_, (id, _)| *id == session.id)
            .is_some()
    }

    /// 取消某个品牌正在进行的运行
    pub fn cancel(&self, subject: &str) -> bool {
        match self.sessions.remove(subject) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消全部运行
    pub fn cancel_all(&self) {
        self.sessions.iter().for_each(|entry| entry.value().1.cancel());
        self.sessions.clear();
    }

    pub fn is_active(&self, subject: &str) -> bool {
        self.sessions.contains_key(subject)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
