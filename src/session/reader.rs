//! Inbound half of a session: frame, classify, route.
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::heartbeat::Liveness;
use super::sink::DataSink;
use super::LinkState;
use crate::message::{classify_or_drop, RawMessage, RecordFramer};
use crate::transport::BoxedReader;

pub(crate) struct ReaderContext {
    pub board: Uuid,
    pub max_record_len: usize,
    pub liveness: Arc<Liveness>,
    pub sink: Option<Arc<dyn DataSink>>,
    pub link: LinkState,
}

pub(crate) async fn reader_loop(ctx: ReaderContext, reader: BoxedReader, mut stop_rx: mpsc::Receiver<()>) {
    let mut framer = RecordFramer::with_max_len(reader, ctx.max_record_len);
    let mut lost = false;

    loop {
        // next_record is not cancel-safe; a stop drops any partly read record.
        let next = tokio::select! {
            _ = stop_rx.recv() => break,
            next = framer.next_record() => next,
        };

        match next {
            Ok(Some(record)) => {
                ctx.liveness.record_seen();
                if let Some(message) = classify_or_drop(&record) {
                    route(&ctx, &message);
                }
            }
            Ok(None) => {
                log::warn!("Board closed the connection");
                lost = true;
                break;
            }
            Err(e) => {
                log::error!("Read from board failed: {}", e);
                lost = true;
                break;
            }
        }
    }

    if lost {
        ctx.link.connection_lost();
    }
    log::debug!("Reader stopped ({} records dropped)", framer.dropped());
}

fn route(ctx: &ReaderContext, message: &RawMessage) {
    if ctx.link.dispatcher.on_message(message) {
        if let RawMessage::Error { message: text, network } = message {
            log::warn!("Board error{}: {}", if *network { " [network]" } else { "" }, text.body);
        }
        return;
    }

    if message.is_data() {
        if let Some(sink) = &ctx.sink {
            sink.publish(ctx.board, message);
        }
    } else if let Some(text) = message.text() {
        log::debug!("Board {:?}: {}", message.kind(), text.body);
    }
}
