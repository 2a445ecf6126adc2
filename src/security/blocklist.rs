use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// 按 key 记录封禁到期时间。过期条目在读取时视为不存在。
#[derive(Default)]
pub struct BlockList {
    entries: DashMap<String, DateTime<Utc>>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, key: &str, duration: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + duration;
        self.entries.insert(key.to_string(), expires_at);
        expires_at
    }

    /// 返回仍然有效的到期时间，顺带清掉已过期的条目
    pub fn active_until(&self, key: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let expires_at = self.entries.get(key).map(|e| *e.value())?;
        if expires_at > now {
            return Some(expires_at);
        }
        self.entries.remove_if(key, |_, exp| *exp <= now);
        None
    }

    pub fn is_blocked(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.active_until(key, now).is_some()
    }

    pub fn remaining_seconds(&self, key: &str, now: DateTime<Utc>) -> i64 {
        self.active_until(key, now)
            .map(|exp| ceil_seconds(exp - now))
            .unwrap_or(0)
    }

    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, exp| *exp > now);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 向上取整到秒，不会为负
pub fn ceil_seconds(remaining: Duration) -> i64 {
    let millis = remaining.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 999) / 1000
    }
}
