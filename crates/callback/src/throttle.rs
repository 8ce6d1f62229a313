//! 实时通道限流
//!
//! 为防止高频事件压垮广播队列，对推送到实时通道的事件做滑动窗口
//! 限流。被限流的事件仍会进入持久分发队列，只是带上跳过实时推送
//! 的标记，不存在数据丢失。

use automesh_core::models::JobEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 事件限流器
///
/// 维护最近 N 次放行时间戳的定长窗口，N 即实时通道的目标速率
/// （每秒事件数）。窗口容量为 0 时限流关闭，全部放行。
#[derive(Debug)]
pub struct EventThrottle {
    capacity: usize,
    window: VecDeque<Instant>,
}

impl EventThrottle {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// 判定事件是否放行到实时通道
    ///
    /// 规则：
    /// - 豁免集合内的事件类型无条件放行；
    /// - 无输出且行号未推进的事件无条件拦截；
    /// - 否则满足任一条件即放行：窗口最旧时间戳已超过1秒、
    ///   按最近速率估算新事件不会超出预算、窗口未满。
    ///
    /// 放行时将 `now` 压入窗口（满则逐出最旧）。
    pub fn decide(&mut self, event: &JobEvent, now: Instant) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.window.is_empty() {
            self.window.push_back(now);
            return true;
        }

        let should_emit = if event.is_minimal() {
            true
        } else if !event.has_output() && event.start_line() == event.end_line() {
            false
        } else {
            let oldest = self.window[0];
            let newest = self.window[self.window.len() - 1];
            now.duration_since(oldest) > Duration::from_secs(1)
                || self.capacity as f64 * now.duration_since(newest).as_secs_f64() > 1.0
                || self.window.len() < self.capacity
        };

        if should_emit {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(now);
        }
        should_emit
    }
}
