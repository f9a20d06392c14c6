use std::time::Duration;

use bytepipe::{Delimiter, MemoryStream, StreamConfig, StreamError};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[tokio::test]
async fn test_write_then_read_everything() {
    let stream = MemoryStream::new();
    assert_eq!(stream.write(ALPHABET, None).await.unwrap(), 26);

    let chunk = stream.read(0, Delimiter::None, None).await.unwrap();
    assert_eq!(chunk, ALPHABET);
}

#[tokio::test]
async fn test_length_capped_reads() {
    let stream = MemoryStream::new();
    stream.write(ALPHABET, None).await.unwrap();

    let chunk = stream.read(13, Delimiter::None, None).await.unwrap();
    assert_eq!(chunk, b"abcdefghijklm");

    let chunk = stream.read(13, Delimiter::None, None).await.unwrap();
    assert_eq!(chunk, b"nopqrstuvwxyz");
}

#[tokio::test]
async fn test_delimiter_read_includes_delimiter() {
    let stream = MemoryStream::new();
    stream.write(ALPHABET, None).await.unwrap();

    let chunk = stream.read(0, Delimiter::Byte(b'f'), None).await.unwrap();
    assert_eq!(chunk, b"abcdef");

    // The rest is still buffered.
    let chunk = stream.read(0, Delimiter::None, None).await.unwrap();
    assert_eq!(chunk, b"ghijklmnopqrstuvwxyz");
}

#[tokio::test]
async fn test_delimiter_absent_returns_all_buffered() {
    let stream = MemoryStream::new();
    stream.write(b"no newline here", None).await.unwrap();

    let chunk = stream.read(0, Delimiter::Byte(b'\n'), None).await.unwrap();
    assert_eq!(chunk, b"no newline here");
}

#[tokio::test]
async fn test_data_preservation_across_writes() {
    let stream = MemoryStream::new();
    stream.write(b"one", None).await.unwrap();
    stream.write(b"two", None).await.unwrap();
    stream.write(b"three", None).await.unwrap();

    // Reads return the concatenation in write order.
    let mut collected = Vec::new();
    collected.extend(stream.read(5, Delimiter::None, None).await.unwrap());
    collected.extend(stream.read(0, Delimiter::None, None).await.unwrap());
    assert_eq!(collected, b"onetwothree");
}

#[tokio::test]
async fn test_initial_data_is_readable() {
    let stream = MemoryStream::with_config(StreamConfig {
        high_water_mark: 0,
        initial: b"seed".to_vec(),
    });

    assert_eq!(stream.read(0, Delimiter::None, None).await.unwrap(), b"seed");
}

#[tokio::test]
async fn test_suspended_read_resolved_by_write() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write(b"wakeup", None).await.unwrap();

    assert_eq!(task.await.unwrap().unwrap(), b"wakeup");
}

#[tokio::test]
async fn test_suspended_read_keeps_its_framing_request() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task =
        tokio::spawn(async move { reader.read(0, Delimiter::Byte(b':'), None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write(b"ab:cd", None).await.unwrap();

    // The waiter is framed with its own delimiter; the tail stays buffered.
    assert_eq!(task.await.unwrap().unwrap(), b"ab:");
    assert_eq!(stream.read(0, Delimiter::None, None).await.unwrap(), b"cd");
}

#[tokio::test]
async fn test_close_rejects_pending_read() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.close();

    assert_eq!(task.await.unwrap(), Err(StreamError::Closed));
    assert!(!stream.is_open());
}

#[tokio::test]
async fn test_second_concurrent_read_is_busy() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let result = stream.read(0, Delimiter::None, None).await;
    assert_eq!(result, Err(StreamError::Busy));

    // The first read is still live and resolves normally.
    stream.write(b"x", None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), b"x");
}

#[tokio::test]
async fn test_read_on_closed_stream_is_unreadable() {
    let stream = MemoryStream::new();
    stream.write(b"buffered", None).await.unwrap();
    stream.close();

    let result = stream.read(0, Delimiter::None, None).await;
    assert_eq!(result, Err(StreamError::Unreadable));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let stream = MemoryStream::new();
    stream.close();
    stream.close();
    assert!(!stream.is_open());
    assert!(!stream.is_writable());
}

#[tokio::test]
async fn test_end_resolves_pending_read_and_closes() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let written = stream.end(ALPHABET, None).await.unwrap();
    assert_eq!(written, 26);

    assert_eq!(task.await.unwrap().unwrap(), ALPHABET);
    assert!(!stream.is_writable());
    assert!(!stream.is_open());
}

#[tokio::test]
async fn test_empty_end_with_pending_reader_rejects_closed() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let written = stream.end(b"", None).await.unwrap();
    assert_eq!(written, 0);

    assert_eq!(task.await.unwrap(), Err(StreamError::Closed));
    assert!(!stream.is_open());
}

#[tokio::test]
async fn test_half_close_drains_then_closes() {
    let stream = MemoryStream::new();
    stream.end(b"abcdef", None).await.unwrap();

    // Half-closed: not writable, still open while bytes remain.
    assert!(!stream.is_writable());
    assert!(stream.is_open());
    assert_eq!(
        stream.write(b"more", None).await,
        Err(StreamError::Unwritable)
    );

    assert_eq!(stream.read(3, Delimiter::None, None).await.unwrap(), b"abc");
    assert!(stream.is_open());

    // Draining the last byte closes the stream.
    assert_eq!(stream.read(0, Delimiter::None, None).await.unwrap(), b"def");
    assert!(!stream.is_open());
    assert_eq!(
        stream.read(0, Delimiter::None, None).await,
        Err(StreamError::Unreadable)
    );
}

#[tokio::test]
async fn test_read_timeout_rejects_and_frees_slot() {
    let stream = MemoryStream::new();

    let result = stream
        .read(0, Delimiter::None, Some(Duration::from_millis(100)))
        .await;
    assert_eq!(result, Err(StreamError::Timeout));

    // The stream is untouched and the slot is free again.
    assert!(stream.is_open());
    stream.write(b"later", None).await.unwrap();
    assert_eq!(stream.read(0, Delimiter::None, None).await.unwrap(), b"later");
}

#[tokio::test]
async fn test_cancelled_read_frees_slot() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    task.abort();
    assert!(task.await.is_err());

    // A fresh read behaves like the first.
    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.write(b"fresh", None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), b"fresh");
}

#[tokio::test]
async fn test_empty_write_resolves_zero_and_wakes_no_reader() {
    let stream = MemoryStream::new();

    let reader = stream.clone();
    let task = tokio::spawn(async move { reader.read(0, Delimiter::None, None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(stream.write(b"", None).await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());

    stream.write(b"real", None).await.unwrap();
    assert_eq!(task.await.unwrap().unwrap(), b"real");
}

#[tokio::test]
async fn test_write_over_high_water_mark_suspends() {
    let stream = MemoryStream::with_config(StreamConfig {
        high_water_mark: 8,
        initial: Vec::new(),
    });

    let writer = stream.clone();
    let task = tokio::spawn(async move { writer.write(b"0123456789", None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());

    // Draining below the mark releases the writer.
    assert_eq!(stream.read(4, Delimiter::None, None).await.unwrap(), b"0123");
    assert_eq!(task.await.unwrap().unwrap(), 10);
}

#[tokio::test]
async fn test_queued_writers_release_in_fifo_order() {
    let stream = MemoryStream::with_config(StreamConfig {
        high_water_mark: 4,
        initial: Vec::new(),
    });

    let first = stream.clone();
    let first_task = tokio::spawn(async move { first.write(b"AAAAAA", None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = stream.clone();
    let second_task = tokio::spawn(async move { second.write(b"BBB", None).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Data landed in call order even while both writers are suspended.
    assert_eq!(
        stream.read(0, Delimiter::None, None).await.unwrap(),
        b"AAAAAABBB"
    );
    assert_eq!(first_task.await.unwrap().unwrap(), 6);
    assert_eq!(second_task.await.unwrap().unwrap(), 3);
}

#[tokio::test]
async fn test_close_rejects_suspended_write() {
    let stream = MemoryStream::with_config(StreamConfig {
        high_water_mark: 16,
        initial: Vec::new(),
    });

    let writer = stream.clone();
    let task = tokio::spawn(async move { writer.write(ALPHABET, None).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());
    stream.close();

    assert_eq!(task.await.unwrap(), Err(StreamError::Closed));
}

#[tokio::test]
async fn test_backpressure_timeout_closes_stream() {
    let stream = MemoryStream::with_config(StreamConfig {
        high_water_mark: 4,
        initial: Vec::new(),
    });

    let first = stream.clone();
    let first_task = tokio::spawn(async move {
        first
            .write(b"AAAAAA", Some(Duration::from_millis(60)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = stream.clone();
    let second_task = tokio::spawn(async move { second.write(b"BBB", None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The timed-out writer fails, and so does every other queued
    // writer, with the same cause.
    assert_eq!(first_task.await.unwrap(), Err(StreamError::Timeout));
    assert_eq!(second_task.await.unwrap(), Err(StreamError::Timeout));
    assert!(!stream.is_open());
    assert!(!stream.is_writable());
}

#[tokio::test]
async fn test_end_after_end_is_unwritable() {
    let stream = MemoryStream::new();
    stream.end(b"tail", None).await.unwrap();
    assert_eq!(stream.end(b"", None).await, Err(StreamError::Unwritable));
}

#[tokio::test]
async fn test_debug_shows_state() {
    let stream = MemoryStream::new();
    let rendered = format!("{stream:?}");
    assert!(rendered.contains("open=true"));
    assert!(rendered.contains("writable=true"));
}
