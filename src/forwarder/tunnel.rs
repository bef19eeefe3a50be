use crate::forwarder::errors::TunnelError;
use crate::forwarder::events::{TunnelMessage, TunnelWatcher};
use crate::forwarder::output::ForwardOutput;
use crate::net::{ConnWriter, PipeStream};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Upper bound for one read in either direction.
const MAX_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Couples one accepted ingress stream with its outputs and mirrors traffic
/// both ways until either side terminates.
///
/// One task per output reads from that output and writes to the ingress; the
/// tunnel itself reads from the ingress and fans each chunk out to every
/// output. When every output-read task has finished the tunnel closes itself
/// so the ingress read unblocks; conversely an ingress EOF or error tears
/// down every output task through the cancellation token.
pub struct ForwardTunnel {
    input: PipeStream,
    outputs: Vec<Arc<ForwardOutput>>,
    watcher: TunnelWatcher,
    cancel: CancellationToken,
}

impl ForwardTunnel {
    pub fn new(
        input: PipeStream,
        outputs: Vec<ForwardOutput>,
        watcher: TunnelWatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            outputs: outputs.into_iter().map(Arc::new).collect(),
            watcher,
            cancel,
        }
    }

    /// Run the tunnel to completion. Emits `TunnelClosed` as the final event
    /// once both directions have stopped and every stream is released.
    pub async fn run(self) {
        let ForwardTunnel {
            input,
            outputs,
            watcher,
            cancel,
        } = self;
        let (mut input_reader, input_writer) = input.into_split();

        let closed_by_output = Arc::new(AtomicBool::new(false));
        let exhausted = Arc::new(AtomicUsize::new(0));
        let total = outputs.len();

        let mut readers = Vec::with_capacity(total);
        for output in &outputs {
            let output = Arc::clone(output);
            let input_writer = Arc::clone(&input_writer);
            let watcher = Arc::clone(&watcher);
            let cancel = cancel.clone();
            let exhausted = Arc::clone(&exhausted);
            let closed_by_output = Arc::clone(&closed_by_output);
            readers.push(tokio::spawn(async move {
                output_to_input(&output, input_writer, &watcher, &cancel).await;
                // Last reader out closes the tunnel so the ingress read
                // unblocks and the peer is not left hanging.
                if exhausted.fetch_add(1, Ordering::SeqCst) + 1 == total
                    && !cancel.is_cancelled()
                {
                    closed_by_output.store(true, Ordering::SeqCst);
                    cancel.cancel();
                }
            }));
        }

        let mut buf = vec![0u8; MAX_CHUNK_SIZE];
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = input_reader.read(&mut buf) => result,
            };
            let n = match result {
                Ok(0) => break,
                Ok(n) => n,
                Err(error) => {
                    if !cancel.is_cancelled() {
                        watcher(TunnelMessage::InputReadError {
                            error: error.into(),
                        });
                    }
                    break;
                }
            };
            let data = Bytes::copy_from_slice(&buf[..n]);
            watcher(TunnelMessage::InputRead { data: data.clone() });

            // Quick path for a single output; otherwise write in parallel
            // and rejoin so every write event for this chunk precedes the
            // next InputRead.
            if outputs.len() == 1 {
                write_to_output(&outputs[0], &data, &watcher).await;
                continue;
            }
            let mut writes = Vec::with_capacity(outputs.len());
            for output in &outputs {
                let output = Arc::clone(output);
                let data = data.clone();
                let watcher = Arc::clone(&watcher);
                writes.push(tokio::spawn(async move {
                    write_to_output(&output, &data, &watcher).await;
                }));
            }
            for write in writes {
                let _ = write.await;
            }
        }

        // Tear down both directions, then report closure exactly once.
        cancel.cancel();
        input_writer.shutdown().await;
        for output in &outputs {
            output.close().await;
        }
        for reader in readers {
            let _ = reader.await;
        }
        watcher(TunnelMessage::TunnelClosed {
            closed_by_output: closed_by_output.load(Ordering::SeqCst),
        });
    }
}

/// Mirror one output back to the ingress until EOF, error, or cancellation.
async fn output_to_input(
    output: &ForwardOutput,
    input_writer: Arc<dyn ConnWriter>,
    watcher: &TunnelWatcher,
    cancel: &CancellationToken,
) {
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = output.read(&mut buf) => result,
        };
        let n = match result {
            Ok(0) => return,
            Ok(n) => n,
            Err(error) => {
                if cancel.is_cancelled() {
                    return;
                }
                watcher(TunnelMessage::OutputReadError {
                    output: output.output_ref(),
                    error,
                });
                return;
            }
        };
        if !output.config().readable {
            // Drain the remote anyway so it never backs up on us.
            continue;
        }
        let data = Bytes::copy_from_slice(&buf[..n]);
        watcher(TunnelMessage::OutputRead {
            output: output.output_ref(),
            data: data.clone(),
        });
        match input_writer.write(&data).await {
            Ok(_) => watcher(TunnelMessage::WriteToInputOk {
                output: output.output_ref(),
                data,
            }),
            Err(error) => watcher(TunnelMessage::WriteToInputError {
                output: output.output_ref(),
                error: error.into(),
            }),
        }
    }
}

/// Mirror one ingress chunk to one output, reporting the outcome.
async fn write_to_output(output: &ForwardOutput, data: &Bytes, watcher: &TunnelWatcher) {
    match output.write(data).await {
        // A non-writable output legitimately reports zero bytes; only a
        // writable one can come up short.
        Ok(n) if n != data.len() && output.config().writable => {
            watcher(TunnelMessage::WriteToOutputError {
                output: output.output_ref(),
                error: TunnelError::ShortWrite {
                    want: data.len(),
                    got: n,
                }
                .into(),
            });
        }
        Ok(_) => watcher(TunnelMessage::WriteToOutputOk {
            output: output.output_ref(),
            data: data.clone(),
        }),
        Err(error) => watcher(TunnelMessage::WriteToOutputError {
            output: output.output_ref(),
            error,
        }),
    }
}
