//! Tracer, backends and hooks working together.

use odf_spy::records::{block, director};
use odf_spy::{
    decode_frame, split_frames, Field, MemoryBackend, PayloadBuilder, PayloadReader, SpyConfig,
    stdout_backend, TraceError, Tracer, WriterBackend,
};

#[test]
fn hook_records_into_memory_backend() {
    let backend = MemoryBackend::new();
    let handle = Tracer::new(SpyConfig::default(), backend.clone()).into_handle();
    let hook = handle.hook();

    let mut payload = PayloadBuilder::new();
    payload.push_receiver(4).push_time(7.5);
    let payload = payload.into_vec();

    hook(block::WRITE, &payload, false).unwrap();
    hook(director::TIME_ADVANCE, &payload, true).unwrap();

    let frames = backend.frames();
    assert_eq!(frames.len(), 2);

    let first = decode_frame(&frames[0], false).unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(first.record_type, block::WRITE);
    assert_eq!(
        PayloadReader::new(&first.payload).fields().unwrap(),
        vec![Field::Receiver(4), Field::Time(7.5)]
    );

    let second = decode_frame(&frames[1], true).unwrap();
    assert_eq!(second.seq, 2);
    assert!(second.timestamp_us.is_some());
}

#[test]
fn oversized_payload_is_rejected() {
    let cfg = SpyConfig {
        max_record_len: 4,
        include_timestamp: false,
    };
    let backend = MemoryBackend::new();
    let handle = Tracer::new(cfg, backend.clone()).into_handle();

    let err = handle.emit(block::READ, &[0u8; 5]).unwrap_err();
    assert!(matches!(err, TraceError::PayloadTooLarge(5)));
    assert!(backend.is_empty());
}

#[test]
fn writer_backend_streams_frames() {
    let mut tracer = Tracer::new(
        SpyConfig {
            max_record_len: 16,
            include_timestamp: false,
        },
        WriterBackend::new(Vec::new()),
    );
    tracer.record(block::READ, &[1], true).unwrap();
    let record = tracer.record(block::READ_RELEASE, &[2], true).unwrap();
    assert_eq!(record.seq, 2);
    assert!(record.timestamp.is_none());
}

#[test]
fn split_frames_reads_back_a_stream() {
    let backend = MemoryBackend::new();
    let handle = Tracer::new(SpyConfig::default(), backend.clone()).into_handle();
    for record_type in [block::READ, block::READ_RELEASE, director::DEADLOCK] {
        handle.emit(record_type, &[]).unwrap();
    }

    let stream: Vec<u8> = backend.frames().concat();
    let types: Vec<u8> = split_frames(&stream)
        .map(|frame| decode_frame(frame, false).unwrap().record_type)
        .collect();
    assert_eq!(
        types,
        vec![block::READ, block::READ_RELEASE, director::DEADLOCK]
    );
}

#[test]
fn timestamps_follow_the_config() {
    let backend = MemoryBackend::new();
    let handle = Tracer::new(SpyConfig::default(), backend.clone()).into_handle();
    assert!(handle
        .emit_with_timestamp(director::INITIALIZE, &[])
        .unwrap()
        .timestamp
        .is_some());
    assert!(handle.emit(director::INITIALIZE, &[]).unwrap().timestamp.is_none());

    let quiet = Tracer::new(
        SpyConfig {
            include_timestamp: false,
            ..SpyConfig::default()
        },
        stdout_backend(),
    )
    .into_handle();
    let record = quiet.emit_with_timestamp(director::TERMINATE, &[]).unwrap();
    assert!(record.timestamp.is_none());
    assert_eq!(record.record_type, director::TERMINATE);
}
