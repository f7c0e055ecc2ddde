#[mockall::automock]
pub trait ClockPort: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}
