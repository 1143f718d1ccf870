#![no_main]

use fuel_terminal::{build_write_frame, decode_request, verify_crc, Frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let crc_ok = verify_crc(data).is_ok();

    if let Ok(fields) = decode_request(data) {
        assert!(crc_ok);
        if fields.function == 0x06 {
            let rebuilt = build_write_frame(fields.address, fields.register, fields.value);
            assert_eq!(rebuilt.as_slice(), data);
        }
    }

    if let Ok(mut frame) = Frame::from_slice(data) {
        assert_eq!(frame.as_slice(), data);
        let _ = frame.push_crc();
    }
});
