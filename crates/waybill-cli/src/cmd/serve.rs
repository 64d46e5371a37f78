use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, bind: &str, port: u16, online: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let queue = Arc::new(super::start_queue(root, online)?);
        waybill_server::serve(queue.clone(), bind, port).await?;
        // Let an in-flight cycle finish before exiting.
        if let Ok(queue) = Arc::try_unwrap(queue) {
            queue.shutdown().await;
        }
        anyhow::Ok(())
    })
}
