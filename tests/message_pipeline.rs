use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use daqlink::message::{DigitalOutputState, MessageKind, PwmReading, RawMessage, RecordFramer};

#[tokio::test]
async fn records_split_across_writes_are_reassembled() {
    let (mut board, client) = tokio::io::duplex(16);
    let writer = tokio::spawn(async move {
        let stream: &[u8] = b"?P2\r\n120,37.5\n1234 5678\x1eDigital Output\r\nValue: 8001\x1eStatus Message\r\nMessage: done\r\n\x1e";
        for chunk in stream.chunks(5) {
            board.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let messages: Vec<RawMessage> = RecordFramer::new(client)
        .into_messages()
        .map(|m| m.unwrap())
        .collect()
        .await;
    writer.await.unwrap();

    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages[0],
        RawMessage::PwmData(PwmReading { channel: 2, timestamp: 12345678, transitions: 120, percentage: 37.5 })
    );
    match &messages[1] {
        RawMessage::DigitalOutputData(DigitalOutputState { outputs }) => {
            assert!(outputs[0]);
            assert!(outputs[15]);
            assert_eq!(outputs.iter().filter(|on| **on).count(), 2);
        }
        other => panic!("unexpected message: {:?}", other),
    }
    assert_eq!(messages[2].kind(), MessageKind::Status);
}

#[tokio::test]
async fn legacy_and_garbage_records_are_skipped() {
    let input: &[u8] = b"Analog Input 3\r\nValue: 7\x1e\x1enot a record\x1e?D4\r\n967711311300,H\x1e";
    let messages: Vec<RawMessage> = RecordFramer::new(input)
        .into_messages()
        .map(|m| m.unwrap())
        .collect()
        .await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind(), MessageKind::DigitalData);
    assert_eq!(messages[0].channel(), Some(4));
}
