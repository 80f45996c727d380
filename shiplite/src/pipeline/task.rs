//! Task trait for staged execution.

use async_trait::async_trait;
use shiplite_shared::errors::ShipliteResult;

/// A unit of work in an execution plan.
///
/// Tasks receive a clone of the shared context and communicate results
/// through it. Names are static so timing entries stay allocation-free.
#[async_trait]
pub trait StageTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> ShipliteResult<()>;

    /// Task name used in logs and timing entries.
    fn name(&self) -> &'static str;
}

pub type BoxedTask<Ctx> = Box<dyn StageTask<Ctx>>;
