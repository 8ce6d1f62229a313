//! # 回调管道
//!
//! 消费任务执行器产生的事件流：逐事件富化、限流判定、推送到持久
//! 分发队列，并累积需要在任务收尾时一次性落库的延迟字段。
//!
//! 每个在途任务对应一个管道实例，事件由执行器进程串行投递，
//! 管道内部不做并发防护。

pub mod artifacts;
pub mod fields;
pub mod pipeline;
pub mod redact;
pub mod throttle;

pub use fields::DeferredFields;
pub use pipeline::{CallbackPipeline, RunConfig};
pub use throttle::EventThrottle;
