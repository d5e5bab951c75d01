use serproto_frame::{
    encode_command, CommandKey, CommandTable, Frame, FrameDecoder, FrameError, HEADER_1, HEADER_2,
};

fn demo_table() -> CommandTable {
    CommandTable::new([("CMD_HEARTBEAT", 0), ("CMD_ACK", 1), ("CMD_TEST1", 4)])
        .expect("demo bindings are unique")
}

/// Small deterministic generator so garbage runs are reproducible.
struct XorShift(u32);

impl XorShift {
    fn next_byte(&mut self) -> u8 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 >> 24) as u8
    }
}

#[test]
fn every_command_and_value_round_trips() {
    let table = demo_table();
    let mut decoder = FrameDecoder::new();

    for name in table.names() {
        for value in 0..=255u8 {
            let wire = encode_command(&table, name, i64::from(value)).unwrap();
            let frames = decoder.decode_all(&wire);
            assert_eq!(frames.len(), 1, "{name}={value}");
            assert_eq!(table.key_for(frames[0].command_id), CommandKey::Named(name.into()));
            assert_eq!(frames[0].value, value);
        }
    }
    assert_eq!(decoder.stats().checksum_errors, 0);
}

#[test]
fn any_checksum_bit_flip_drops_frame() {
    let table = demo_table();
    for value in [0u8, 1, 123, 254, 255] {
        let wire = encode_command(&table, "CMD_TEST1", i64::from(value)).unwrap();
        for bit in 0..8 {
            let mut corrupted = wire;
            corrupted[4] ^= 1 << bit;
            let mut decoder = FrameDecoder::new();
            assert!(decoder.decode_all(&corrupted).is_empty(), "value {value} bit {bit}");
            assert_eq!(decoder.stats().checksum_errors, 1);
        }
    }
}

#[test]
fn garbage_then_frame_decodes_once() {
    let frame = Frame::new(4, 123);
    let mut rng = XorShift(0x9E37_79B9);

    for len in [0usize, 1, 2, 5, 17, 64, 300] {
        let garbage: Vec<u8> = std::iter::repeat_with(|| rng.next_byte())
            .filter(|byte| *byte != HEADER_1 && *byte != HEADER_2)
            .take(len)
            .collect();

        let mut decoder = FrameDecoder::new();
        let mut wire = garbage;
        wire.extend_from_slice(&frame.to_bytes());
        assert_eq!(decoder.decode_all(&wire), vec![frame], "garbage length {len}");
    }
}

#[test]
fn abandoned_header_then_frame_decodes_once() {
    // A lone header byte followed by noise must not swallow the next real frame.
    let mut wire = vec![HEADER_1, 0x00, 0x42, HEADER_1, HEADER_2];
    // Truncated frame: 0x11 lands in its checksum slot and fails.
    wire.extend_from_slice(&[9, 9, 0x11, 0x22]);
    wire.extend_from_slice(&Frame::new(1, 5).to_bytes());

    let mut decoder = FrameDecoder::new();
    let frames = decoder.decode_all(&wire);
    assert_eq!(frames, vec![Frame::new(1, 5)]);
}

#[test]
fn concrete_scenario_bytes() {
    let table = demo_table();
    let wire = encode_command(&table, "CMD_TEST1", 123).unwrap();
    assert_eq!(wire, [0xFF, 0xFE, 4, 123, 127]);

    let mut decoder = FrameDecoder::new();
    let frames = decoder.decode_all(&wire);
    assert_eq!(frames.len(), 1);
    assert_eq!(table.key_for(frames[0].command_id), CommandKey::Named("CMD_TEST1".into()));
    assert_ne!(table.key_for(frames[0].command_id), CommandKey::Named("CMD_HEARTBEAT".into()));
}

#[test]
fn unmapped_id_decodes_to_raw_key() {
    let table = demo_table();
    let mut decoder = FrameDecoder::new();
    let frames = decoder.decode_all(&Frame::new(200, 7).to_bytes());
    assert_eq!(frames.len(), 1);
    assert_eq!(table.key_for(frames[0].command_id), CommandKey::Raw(200));
}

#[test]
fn duplicate_bindings_fail_construction() {
    assert!(matches!(
        CommandTable::new([("CMD_A", 3), ("CMD_B", 3)]),
        Err(FrameError::DuplicateCommandBinding { .. })
    ));
    assert!(matches!(
        CommandTable::new([("CMD_A", 3), ("CMD_A", 4)]),
        Err(FrameError::DuplicateCommandBinding { .. })
    ));
}
