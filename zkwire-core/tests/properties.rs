//! Property-based tests for the codec and transfer reassembly

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use zkwire_core::{framing, Accepted, ChunkPlan, Error, FrameDecoder, Packet, PendingTransfer};

fn packet_strategy() -> impl Strategy<Value = Packet> {
    (
        any::<u16>(),
        any::<u16>(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(|(command, session_id, reply_id, payload)| {
            Packet::with_payload(command, session_id, reply_id, payload)
        })
}

// Property: decode(encode(f)) == f for every frame
proptest! {
    #[test]
    fn prop_packet_roundtrip(packet in packet_strategy()) {
        let decoded = Packet::decode(packet.encode()).expect("Decoding should not fail");
        prop_assert_eq!(decoded, packet);
    }
}

// Property: any single bit flip is reported as a checksum mismatch
proptest! {
    #[test]
    fn prop_single_bit_flip_detected(packet in packet_strategy(), bit in any::<prop::sample::Index>()) {
        let mut encoded = packet.encode();
        let bit = bit.index(encoded.len() * 8);
        encoded[bit / 8] ^= 1 << (bit % 8);

        prop_assert!(matches!(
            Packet::decode(encoded),
            Err(Error::ChecksumMismatch { .. })
        ), "expected ChecksumMismatch");
    }
}

// Property: decoding arbitrary bytes never panics
proptest! {
    #[test]
    fn prop_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Packet::decode(BytesMut::from(&data[..]));
        let mut buf = BytesMut::from(&data[..]);
        let _ = FrameDecoder::new().decode(&mut buf);
    }
}

// Property: a TCP stream split at any point yields the same packets
proptest! {
    #[test]
    fn prop_tcp_stream_split(
        packets in prop::collection::vec(packet_strategy(), 1..5),
        split in any::<prop::sample::Index>(),
    ) {
        let mut stream = BytesMut::new();
        for packet in &packets {
            stream.extend_from_slice(&framing::wrap(packet));
        }
        let split = split.index(stream.len());

        let decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&stream[..split]);
        let mut decoded = Vec::new();
        while let Some(inner) = decoder.decode(&mut buf).unwrap() {
            decoded.push(Packet::decode(inner).unwrap());
        }
        buf.extend_from_slice(&stream[split..]);
        while let Some(inner) = decoder.decode(&mut buf).unwrap() {
            decoded.push(Packet::decode(inner).unwrap());
        }

        prop_assert_eq!(decoded, packets);
    }
}

// Property: chunks delivered in any order, with duplicates, reassemble exactly
proptest! {
    #[test]
    fn prop_chunk_reassembly_any_order(
        data in prop::collection::vec(any::<u8>(), 1..4000),
        chunk_size in 1u32..700,
        keys in prop::collection::vec(any::<u16>(), 1..32),
        duplicates in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let data = Bytes::from(data);
        let plan: Vec<_> = ChunkPlan::new(data.len() as u32, chunk_size).collect();

        let mut order: Vec<usize> = (0..plan.len()).collect();
        order.sort_by_key(|&i| (keys[i % keys.len()], i));

        let mut transfer = PendingTransfer::new(data.len() as u32);
        for &i in &order {
            let chunk = plan[i];
            let bytes = data.slice(chunk.start as usize..(chunk.start + chunk.size) as usize);
            prop_assert_eq!(transfer.accept_at(chunk.start, bytes).unwrap(), Accepted::New);
        }
        for dup in &duplicates {
            let chunk = plan[dup.index(plan.len())];
            let bytes = data.slice(chunk.start as usize..(chunk.start + chunk.size) as usize);
            prop_assert_eq!(transfer.accept_at(chunk.start, bytes).unwrap(), Accepted::Duplicate);
        }

        prop_assert_eq!(transfer.chunk_index(), plan.len() as u32);
        prop_assert_eq!(transfer.finish().unwrap(), data);
    }
}

// Property: a transfer with any chunk missing never yields bytes
proptest! {
    #[test]
    fn prop_missing_chunk_exposes_nothing(
        total in 2u32..4000,
        chunk_size in 1u32..700,
        missing in any::<prop::sample::Index>(),
    ) {
        let plan: Vec<_> = ChunkPlan::new(total, chunk_size).collect();
        let missing = missing.index(plan.len());

        let mut transfer = PendingTransfer::new(total);
        for chunk in plan.iter().filter(|c| c.index as usize != missing) {
            transfer.accept_at(chunk.start, Bytes::from(vec![0u8; chunk.size as usize])).unwrap();
        }

        prop_assert_eq!(transfer.first_gap(), Some((plan[missing].start, plan[missing].size)));
        let is_incomplete = matches!(transfer.finish(), Err(Error::TransferIncomplete { .. }));
        prop_assert!(is_incomplete);
    }
}
