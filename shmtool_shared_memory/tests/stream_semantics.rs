//! Cursor and bounds behaviour, checked on the simulated kernel

use proptest::prelude::*;
use shmtool_shared_memory::{Segment, ShmError, SimulatedKernel};
use std::io::SeekFrom;

fn segment(size: usize) -> Segment<SimulatedKernel> {
    shmtool_shared_memory::init_tracing();
    Segment::create_in(SimulatedKernel::new(), size).unwrap()
}

#[test]
fn test_seek_past_end_reports_end_of_stream() {
    let mut seg = segment(64);

    assert_eq!(seg.seek(SeekFrom::Start(64)).unwrap(), 64);
    assert_eq!(seg.read(&mut [0u8; 8]).unwrap(), 0);
    assert_eq!(seg.write(&[1u8; 8]).unwrap(), 0);

    assert_eq!(seg.seek(SeekFrom::Start(1000)).unwrap(), 1000);
    assert!(seg.is_exhausted());
    assert_eq!(seg.read(&mut [0u8; 8]).unwrap(), 0);
    assert_eq!(seg.position(), 1000);
}

#[test]
fn test_negative_seeks_fail() {
    let mut seg = segment(64);

    assert!(matches!(
        seg.seek(SeekFrom::Current(-1)),
        Err(ShmError::InvalidSeek { .. })
    ));
    assert!(matches!(
        seg.seek(SeekFrom::End(-65)),
        Err(ShmError::InvalidSeek { .. })
    ));
    assert!(matches!(
        seg.seek(SeekFrom::Current(i64::MIN)),
        Err(ShmError::InvalidSeek { .. })
    ));
}

#[test]
fn test_reset_is_idempotent() {
    let mut seg = segment(32);
    seg.write(&[7u8; 10]).unwrap();

    seg.reset();
    assert_eq!(seg.position(), 0);
    seg.reset();
    assert_eq!(seg.position(), 0);
}

#[test]
fn test_sequential_reads_walk_segment() {
    let mut seg = segment(10);
    seg.write(b"0123456789").unwrap();
    seg.reset();

    let mut chunks = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let n = seg.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        chunks.push(buf[..n].to_vec());
    }

    assert_eq!(chunks, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
}

#[test]
fn test_page_rounded_segment_is_fully_addressable() {
    let mut seg = Segment::create_in(SimulatedKernel::with_page_size(4096), 100).unwrap();
    assert_eq!(seg.size(), 4096);

    assert_eq!(seg.write(&vec![0xEE; 5000]).unwrap(), 4096);
    assert_eq!(seg.read_chunk(Some(4), 4092).unwrap(), vec![0xEE; 4]);
}

#[test]
fn test_std_io_traits() {
    use std::io::{Read, Seek, Write};

    let mut seg = segment(16);
    let written = std::io::copy(&mut &b"stream through io"[..], &mut seg);
    assert_eq!(
        written.unwrap_err().kind(),
        std::io::ErrorKind::WriteZero
    );

    Seek::seek(&mut seg, SeekFrom::Start(0)).unwrap();
    let mut out = String::new();
    seg.read_to_string(&mut out).unwrap();
    assert_eq!(out, "stream through i");

    let err = Seek::seek(&mut seg, SeekFrom::Current(-100)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    seg.flush().unwrap();
}

proptest! {
    #[test]
    fn prop_roundtrip(size in 1usize..2048, frac in 0.0f64..=1.0, seed in any::<u8>()) {
        let n = ((size as f64) * frac) as usize;
        let data: Vec<u8> = (0..n).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();

        let mut seg = segment(size);
        prop_assert_eq!(seg.write(&data).unwrap(), n);
        seg.reset();

        let mut out = vec![0u8; n];
        let read = seg.read(&mut out).unwrap();
        prop_assert_eq!(read, n);
        prop_assert_eq!(out, data);
    }

    #[test]
    fn prop_transfers_stay_in_bounds(
        size in 1usize..512,
        cursor in 0u64..1024,
        requested in 0usize..2048,
    ) {
        let mut seg = segment(size);
        seg.seek(SeekFrom::Start(cursor)).unwrap();

        let limit = (size as u64).saturating_sub(cursor) as usize;
        let expected = requested.min(limit);

        let written = seg.write(&vec![0xAB; requested]).unwrap();
        prop_assert_eq!(written, expected);
        prop_assert!(seg.position() <= (size as u64).max(cursor));

        seg.seek(SeekFrom::Start(cursor)).unwrap();
        let mut buf = vec![0u8; requested];
        let read = seg.read(&mut buf).unwrap();
        prop_assert_eq!(read, expected);
        prop_assert!(buf[..read].iter().all(|&b| b == 0xAB));
        prop_assert!(buf[read..].iter().all(|&b| b == 0));
    }

    #[test]
    fn prop_seek_never_negative(size in 1usize..256, start in 0u64..512, delta in -1024i64..1024) {
        let mut seg = segment(size);
        seg.seek(SeekFrom::Start(start)).unwrap();

        match seg.seek(SeekFrom::Current(delta)) {
            Ok(pos) => {
                prop_assert_eq!(pos as i128, start as i128 + delta as i128);
                prop_assert_eq!(seg.position(), pos);
            }
            Err(ShmError::InvalidSeek { base, offset }) => {
                prop_assert!((start as i128) + (delta as i128) < 0);
                prop_assert_eq!((base, offset), (start, delta));
                prop_assert_eq!(seg.position(), start);
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }
}
