use std::time::Duration;

/// 一次计数之后的限流窗口状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// 当前窗口内的请求数（包括本次）
    pub count: u64,
    /// 距离窗口重置的剩余时间
    pub resets_in: Duration,
}
