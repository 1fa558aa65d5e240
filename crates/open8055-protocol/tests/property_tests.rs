//! Property-based tests for the client line framing and the HID report codec.

use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

use open8055_core::constants::{HID_MESSAGE_SIZE, MSG_INPUT, MSG_OUTPUT};
use open8055_protocol::{CommandParser, LineCodec, Report};

/// Strategy for printable command lines without terminators.
fn command_line() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 x-]{0,40}")
        .expect("Failed to create command line regex strategy")
}

fn decode_all(codec: &mut LineCodec, buffer: &mut BytesMut, out: &mut Vec<String>) {
    while let Some(line) = codec.decode(buffer).unwrap() {
        out.push(line);
    }
}

proptest! {
    /// Property: how the byte stream is chunked never changes the lines
    /// the decoder produces.
    #[test]
    fn prop_line_split_invariance(
        lines in prop::collection::vec(command_line(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let stream: Vec<u8> = lines
            .iter()
            .flat_map(|l| l.bytes().chain(std::iter::once(b'\n')))
            .collect();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len())).collect();
        points.push(stream.len());
        points.sort_unstable();

        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        let mut start = 0;
        for point in points {
            buffer.extend_from_slice(&stream[start..point]);
            decode_all(&mut codec, &mut buffer, &mut decoded);
            start = point;
        }

        let expected: Vec<String> = lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        prop_assert_eq!(decoded, expected);
    }

    /// Property: the parser never panics on arbitrary input.
    #[test]
    fn prop_parser_total(line in "\\PC{0,80}") {
        let _ = CommandParser::parse(&line);
    }

    /// Property: every INPUT report body decodes and re-encodes to itself.
    #[test]
    fn prop_input_report_fields(body in prop::array::uniform15(any::<u8>())) {
        let mut raw = [0u8; HID_MESSAGE_SIZE];
        raw[0] = MSG_INPUT;
        raw[1..16].copy_from_slice(&body);

        let report = Report::decode(&raw).unwrap();
        let Report::Input(input) = report else {
            panic!("expected input report");
        };
        prop_assert_eq!(input.input_bits, body[0]);
        prop_assert_eq!(input.counters[0], u16::from_le_bytes([body[1], body[2]]));
        prop_assert_eq!(input.adc[1], u16::from_le_bytes([body[13], body[14]]));
        prop_assert_eq!(report.encode(), raw);
    }

    /// Property: decoding an OUTPUT report ignores padding bytes.
    #[test]
    fn prop_output_padding_ignored(padding in prop::array::uniform8(any::<u8>())) {
        let mut raw = [0u8; HID_MESSAGE_SIZE];
        raw[0] = MSG_OUTPUT;
        raw[1] = 0x0F;
        raw[24..32].copy_from_slice(&padding);

        let Report::Output(out) = Report::decode(&raw).unwrap() else {
            panic!("expected output report");
        };
        prop_assert_eq!(out.output_bits, 0x0F);
        prop_assert_eq!(out.reset_counters, 0);
    }
}
