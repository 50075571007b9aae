//! Request frames read back through the reply-side field parser

use std::sync::Arc;

use pretty_assertions::assert_eq;
use zero_hostdb::buffer_pool::BufferPool;
use zero_hostdb::ccsid::{CharConverter, Utf8Converter, Utf16Converter};
use zero_hostdb::constant::{CCSID_UCS2, OperationId, VARIABLE_DATA_OFFSET, request_cp};
use zero_hostdb::protocol::compression::{compress_rle, decompress_rle, expand_frame};
use zero_hostdb::protocol::header::RequestTemplate;
use zero_hostdb::protocol::primitive::get_u16;
use zero_hostdb::protocol::{LibraryEntry, RawFields, RequestFrame};

fn fields(frame: &[u8]) -> Vec<(u16, Vec<u8>)> {
    RawFields::new(frame)
        .unwrap()
        .map(|f| {
            let f = f.unwrap();
            (f.code_point, frame[f.payload].to_vec())
        })
        .collect()
}

#[test]
fn test_parameters_read_back_unchanged() {
    let pool = Arc::new(BufferPool::new(4));
    let mut frame = RequestFrame::new(&pool, OperationId::PrepareDescribe);
    frame.add_parameter(0x3850, &[1, 2, 3]);
    frame.add_u16(0x3851, 0xBEEF);
    frame.add_u32(request_cp::BLOCKING_FACTOR, 10);
    frame.add_var_string(request_cp::STATEMENT_TEXT, "SELECT 1", &Utf8Converter).unwrap();
    frame.add_fixed_string(request_cp::CURSOR_NAME, "C1", &Utf16Converter::new(CCSID_UCS2));
    frame
        .add_library_list(
            &[
                LibraryEntry {
                    indicator: b'C',
                    name: "QGPL",
                },
                LibraryEntry {
                    indicator: b'L',
                    name: "APP",
                },
            ],
            &Utf8Converter,
        )
        .unwrap();
    frame.add_parameter(0x3852, &[]);
    assert_eq!(frame.parameter_count(), 7);

    let bytes = frame.encoded().unwrap().to_vec();
    assert_eq!(get_u16(&bytes, 38).unwrap(), 7);

    let mut statement = vec![0x04, 0xB8, 0, 8];
    statement.extend_from_slice(b"SELECT 1");
    let mut cursor = CCSID_UCS2.to_be_bytes().to_vec();
    cursor.extend(Utf16Converter::new(CCSID_UCS2).to_host("C1"));
    let mut libraries = vec![0x04, 0xB8, 0, 2];
    libraries.extend_from_slice(&[b'C', 0, 4]);
    libraries.extend_from_slice(b"QGPL");
    libraries.extend_from_slice(&[b'L', 0, 3]);
    libraries.extend_from_slice(b"APP");

    assert_eq!(
        fields(&bytes),
        vec![
            (0x3850, vec![1, 2, 3]),
            (0x3851, vec![0xBE, 0xEF]),
            (request_cp::BLOCKING_FACTOR, vec![0, 0, 0, 10]),
            (request_cp::STATEMENT_TEXT, statement),
            (request_cp::CURSOR_NAME, cursor),
            (request_cp::LIBRARY_LIST, libraries),
            (0x3852, vec![]),
        ]
    );
}

/// Frame whose variable region is exactly `var_len` bytes of zeros
fn zero_frame(pool: &Arc<BufferPool>, var_len: usize) -> RequestFrame {
    let mut frame = RequestFrame::new(pool, OperationId::Execute);
    frame.add_parameter(0x3850, &vec![0; var_len - 6]);
    frame.compress();
    assert_eq!(frame.variable_length(), var_len);
    frame
}

fn is_compressed(bytes: &[u8]) -> bool {
    RequestTemplate::from_bytes(bytes).unwrap().is_compressed()
}

#[test]
fn test_compression_threshold() {
    let pool = Arc::new(BufferPool::new(4));

    let mut below = zero_frame(&pool, 1063);
    let bytes = below.encoded().unwrap();
    assert!(!is_compressed(bytes));
    assert_eq!(bytes.len(), VARIABLE_DATA_OFFSET + 1063);

    let mut above = zero_frame(&pool, 1065);
    let bytes = above.encoded().unwrap().to_vec();
    assert!(is_compressed(&bytes));
    assert!(bytes.len() < VARIABLE_DATA_OFFSET + 1065);

    let mut expanded = Vec::new();
    expand_frame(&bytes, &mut expanded).unwrap();
    assert!(!is_compressed(&expanded));
    assert_eq!(fields(&expanded), vec![(0x3850, vec![0; 1059])]);
}

#[test]
fn test_compression_abandoned_without_gain() {
    let pool = Arc::new(BufferPool::new(4));
    let noise: Vec<u8> = (0..2000u32)
        .map(|i| (i * 7 % 251) as u8 ^ 0x5A)
        .filter(|&b| b != 0x1B)
        .collect();

    let mut frame = RequestFrame::new(&pool, OperationId::Execute);
    frame.add_parameter(0x3850, &noise);
    frame.compress();
    let bytes = frame.encoded().unwrap();
    assert!(!is_compressed(bytes));
    assert_eq!(bytes.len(), VARIABLE_DATA_OFFSET + 6 + noise.len());
}

#[test]
fn test_rle_round_trip_varied_inputs() {
    let mut inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0x1B],
        vec![0x1B; 9],
        vec![7; 4],
        vec![7; 5],
        vec![0; 70_000],
        b"abc\x1b\x1b\x1bdef".to_vec(),
    ];
    let mut seed = 0x9E37_79B9u32;
    inputs.push(
        (0..4096)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                // small alphabet so runs appear
                (seed % 4) as u8 + 0x19
            })
            .collect(),
    );

    for input in inputs {
        let mut encoded = Vec::new();
        compress_rle(&input, &mut encoded);
        let mut decoded = Vec::new();
        decompress_rle(&encoded, &mut decoded, input.len()).unwrap();
        assert_eq!(decoded, input);
    }
}
