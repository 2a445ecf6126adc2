use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};

use crate::config::LoginAttemptConfig;
use crate::security::BlockList;

use super::types::AttemptCounter;

/// 按 IP 统计连续登录失败次数，达到上限后封禁一段时间。
///
/// 状态：无记录 -> 计数中 -> 封禁 -> (登录成功或封禁到期) 无记录
pub struct AttemptTracker {
    config: LoginAttemptConfig,
    counters: DashMap<String, AttemptCounter>,
    blocks: BlockList,
}

impl AttemptTracker {
    pub fn new(config: LoginAttemptConfig) -> Self {
        info!(
            "初始化登录尝试限制: 最多 {} 次, 封禁 {} 秒",
            config.max_attempts,
            config.block_duration.num_seconds()
        );
        Self {
            config,
            counters: DashMap::new(),
            blocks: BlockList::new(),
        }
    }

    pub fn record_failure(&self, ip: &str) -> u32 {
        self.record_failure_at(ip, Utc::now())
    }

    pub fn record_failure_at(&self, ip: &str, now: DateTime<Utc>) -> u32 {
        let mut counter = self
            .counters
            .entry(ip.to_string())
            .or_insert_with(|| AttemptCounter {
                count: 0,
                last_attempt: now,
            });

        // 窗口内无新失败则自动归零
        if now - counter.last_attempt >= self.config.window {
            counter.count = 0;
        }
        counter.count += 1;
        counter.last_attempt = now;
        let count = counter.count;
        warn!("IP {} 登录失败，当前失败次数: {}", ip, count);

        if count >= self.config.max_attempts {
            self.blocks.block(ip, self.config.block_duration, now);
            counter.count = 0;
            warn!(
                "IP {} 登录失败次数达到 {}，封禁 {} 秒",
                ip,
                count,
                self.config.block_duration.num_seconds()
            );
        }
        count
    }

    pub fn record_success(&self, ip: &str) {
        debug!("重置 IP {} 的登录尝试记录", ip);
        self.counters.remove(ip);
        self.blocks.clear(ip);
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.is_blocked_at(ip, Utc::now())
    }

    pub fn is_blocked_at(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.blocks.is_blocked(ip, now)
    }

    /// 未封禁时为 0，否则向上取整到秒
    pub fn remaining_block_seconds(&self, ip: &str) -> i64 {
        self.remaining_block_seconds_at(ip, Utc::now())
    }

    pub fn remaining_block_seconds_at(&self, ip: &str, now: DateTime<Utc>) -> i64 {
        self.blocks.remaining_seconds(ip, now)
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let window = self.config.window;
        let before = self.counters.len();
        self.counters
            .retain(|_, c| c.count > 0 && now - c.last_attempt < window);
        let purged = before - self.counters.len() + self.blocks.purge_expired(now);
        debug!("登录尝试记录清理了 {} 个过期条目", purged);
        purged
    }
}
