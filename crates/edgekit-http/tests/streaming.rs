//! Integration tests for streaming bodies:
//! - byte-granular pass-through with sticky end of stream
//! - multi-megabyte relay through a backend with chunk ordering intact
//! - reads never hand out more than one transport chunk at a time

use std::sync::Arc;

use bytes::Bytes;
use edgekit_core::memory::{BackendResponse, MemoryTransport};
use edgekit_core::transport::Transport;
use edgekit_core::Context;
use edgekit_http::{Body, Request, RequestBody, DEFAULT_CHUNK_SIZE};
use futures_util::StreamExt;

fn transport() -> (MemoryTransport, Arc<dyn Transport>) {
    let memory = MemoryTransport::new();
    let shared: Arc<dyn Transport> = Arc::new(memory.clone());
    (memory, shared)
}

// ── Byte granularity ────────────────────────────────────────────────

#[tokio::test]
async fn doubling_each_byte_through_two_bodies() {
    let (_memory, shared) = transport();

    let mut input = Body::new(shared.clone()).unwrap();
    input.write_all(b"0123456789").unwrap();
    input.close().unwrap();

    let mut output = Body::new(shared).unwrap();
    let mut byte = [0u8; 1];
    while input.read(&mut byte).await.unwrap() == 1 {
        output.write_all(&[byte[0], byte[0]]).unwrap();
    }
    output.close().unwrap();

    assert_eq!(output.into_bytes().await.unwrap(), "00112233445566778899");
    assert_eq!(input.read(&mut byte).await.unwrap(), 0);
}

#[tokio::test]
async fn reader_sees_bytes_as_they_are_written() {
    let (_memory, shared) = transport();
    let mut writer = Body::new(shared.clone()).unwrap();
    let handle = writer.handle();

    let reader = tokio::spawn(async move {
        let mut reader = Body::from_handle(shared, handle, edgekit_http::BodyMode::Read);
        let mut seen = Vec::new();
        let mut byte = [0u8; 1];
        while reader.read(&mut byte).await.unwrap() == 1 {
            seen.push(byte[0]);
        }
        seen
    });

    for b in b"trickle" {
        writer.write_all(std::slice::from_ref(b)).unwrap();
        tokio::task::yield_now().await;
    }
    writer.close().unwrap();

    assert_eq!(reader.await.unwrap(), b"trickle");
}

// ── Large relay ─────────────────────────────────────────────────────

#[tokio::test]
async fn relay_4mb_preserves_chunk_ordering() {
    let (memory, shared) = transport();
    memory.backend("sink", |req| async move {
        Ok(BackendResponse::new(200).with_body(req.body))
    });
    let ctx = Context::background().with_transport(shared);

    let chunk_size = 1024;
    let total_chunks: usize = 4 * 1024;
    let stream = futures_util::stream::iter((0..total_chunks).map(move |i| {
        let mut chunk = vec![0u8; chunk_size];
        chunk[0..4].copy_from_slice(&(i as u32).to_le_bytes());
        Ok(Bytes::from(chunk))
    }));

    let mut req = Request::new("POST", "https://sink.example/", RequestBody::from_stream(stream)).unwrap();
    let resp = req.send(&ctx, "sink").await.unwrap();
    let body = resp.into_bytes().await.unwrap();

    assert_eq!(body.len(), total_chunks * chunk_size);
    for i in 0..total_chunks {
        let offset = i * chunk_size;
        let id = u32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
        assert_eq!(id, i as u32, "chunk {i} out of order");
    }
}

#[tokio::test]
async fn stream_chunks_are_bounded() {
    let (_memory, shared) = transport();
    let mut body = Body::new(shared).unwrap();
    body.write_all(&vec![b'x'; 3 * DEFAULT_CHUNK_SIZE + 17]).unwrap();
    body.close().unwrap();

    let mut stream = body.into_stream();
    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= DEFAULT_CHUNK_SIZE, "chunk of {} bytes", chunk.len());
        total += chunk.len();
    }
    assert_eq!(total, 3 * DEFAULT_CHUNK_SIZE + 17);
}

#[tokio::test]
async fn partially_read_body_forwards_unread_rest() {
    let (memory, shared) = transport();
    memory.backend("sink", |req| async move {
        Ok(BackendResponse::new(200).with_body(req.body))
    });
    let ctx = Context::background().with_transport(shared.clone());

    let mut source = Body::new(shared).unwrap();
    source.write_all(b"header:rest of the payload").unwrap();
    source.close().unwrap();

    let mut peek = [0u8; 7];
    assert_eq!(source.read(&mut peek).await.unwrap(), 7);
    assert_eq!(&peek, b"header:");

    let mut req = Request::new("POST", "https://sink.example/", source).unwrap();
    let echoed = req.send(&ctx, "sink").await.unwrap().into_bytes().await.unwrap();
    assert_eq!(echoed, "rest of the payload");
}
