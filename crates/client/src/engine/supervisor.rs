use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::ports::{StreamReader, StreamWriter};

use super::SessionRuntime;

/// Waits for both stream tasks, then closes the stream and finishes the session.
pub(super) async fn run(
    runtime: Arc<SessionRuntime>,
    reader: JoinHandle<Box<dyn StreamReader>>,
    writer: JoinHandle<Box<dyn StreamWriter>>,
) {
    let (reader, writer) = tokio::join!(reader, writer);
    // Both tasks are done, make sure nothing else treats the session as live.
    runtime.cancel.cancel();

    match writer {
        Ok(mut writer) => {
            if let Err(e) = writer.complete_send().await {
                tracing::debug!(error = %e, "complete_send failed during teardown");
            }
        }
        Err(e) => runtime.fail(format!("writer task failed: {e}")),
    }

    match reader {
        Ok(mut reader) => reader.dispose().await,
        Err(e) => runtime.fail(format!("reader task failed: {e}")),
    }

    runtime.engine.finish_session(runtime.take_fault());
}
