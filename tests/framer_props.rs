// tests/framer_props.rs

use deployer::framer::LineFramer;
use proptest::prelude::*;

/// Rejoin framed lines the way the stream carried them.
fn rebuild(lines: &[Vec<u8>], terminated: bool) -> Vec<u8> {
    let mut out = lines.join(&b'\n');
    if terminated && !lines.is_empty() {
        out.push(b'\n');
    }
    out
}

fn stream_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Newline-heavy streams exercise empty lines and carry-over.
        proptest::collection::vec(
            proptest::sample::select(vec![b'a', b'\r', b'\n', 0xff, 0x80]),
            0..200,
        ),
        proptest::collection::vec(any::<u8>(), 0..400),
    ]
}

proptest! {
    #[test]
    fn chunking_never_changes_the_bytes(
        bytes in stream_bytes(),
        cuts in proptest::collection::vec(1..16usize, 1..40),
    ) {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();

        let mut rest = bytes.as_slice();
        let mut cuts = cuts.iter().cycle();
        while !rest.is_empty() {
            let n = (*cuts.next().unwrap()).min(rest.len());
            let (chunk, tail) = rest.split_at(n);
            lines.extend(framer.push(chunk).lines);
            rest = tail;
        }
        if let Some(group) = framer.finish() {
            lines.extend(group.lines);
        }

        prop_assert!(lines.iter().all(|line| !line.contains(&b'\n')));
        prop_assert_eq!(rebuild(&lines, bytes.ends_with(b"\n")), bytes);
    }
}
