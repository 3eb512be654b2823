//! Single-statement atomic update (`SET counter = counter + 1`).

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::strategy::WorkerContext;

pub fn run(backend: &dyn StorageBackend, ctx: &WorkerContext<'_>) -> Result<()> {
    for _ in 0..ctx.iterations {
        if ctx.is_cancelled() {
            break;
        }
        backend.atomic_increment()?;
        ctx.stats.committed.incr();
    }
    Ok(())
}
