//! The store's own atomic counter object (e.g. a CP atomic long).

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::strategy::WorkerContext;

pub fn run(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    for _ in 0..ctx.iterations {
        if ctx.is_cancelled() {
            break;
        }
        backend.native_increment()?;
        ctx.stats.committed.incr();
    }
    Ok(())
}
