//! Randomised checks of the buffered input read paths.
//!
//! Every input here is built over a `ChunkDriver`, so the physical chunking
//! is fully controlled while the logical byte stream stays the same.

use netbuf::drivers::ChunkDriver;
use netbuf::{BlockPools, BufferedInput, Driver, InputConfig, InputState};
use proptest::prelude::*;

const SENTINEL: u8 = 0xEE;

fn build(data: &[u8], chunk: usize, mtu: usize, threshold: usize, fill: bool) -> BufferedInput {
    let driver = ChunkDriver::new(data.to_vec(), chunk);
    let driver = if fill {
        Driver::fills(driver)
    } else {
        Driver::pulls(driver)
    };
    let config = InputConfig {
        zero_copy_threshold: threshold,
        max_mtu: 0,
    };
    let mut input = BufferedInput::new(driver, BlockPools::new(), config);
    input.init_receive(mtu, 0).unwrap();
    input
}

/// Cut `total` bytes into read lengths drawn from `sizes`, cycling.
fn plan_reads(total: usize, sizes: &[usize]) -> Vec<usize> {
    let mut reads = Vec::new();
    let mut left = total;
    for &size in sizes.iter().cycle() {
        if left == 0 {
            break;
        }
        let n = size.min(left);
        reads.push(n);
        left -= n;
    }
    reads
}

/// Run `reads` as array reads and return everything read, in order.
fn drain(input: &mut BufferedInput, reads: &[usize]) -> Vec<u8> {
    let mut out = Vec::new();
    for &len in reads {
        let mut dest = vec![0u8; len];
        input.read_array(&mut dest, 0, len).unwrap();
        out.extend_from_slice(&dest);
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Byte,
    Buffered(usize),
    Array(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Byte),
        (1usize..300).prop_map(Op::Buffered),
        (1usize..900).prop_map(Op::Array),
    ]
}

/// Run a mixed read plan, then drain the rest with one array read.
fn run_plan(input: &mut BufferedInput, total: usize, ops: &[Op]) -> Vec<u8> {
    let mut out = Vec::with_capacity(total);
    for &op in ops {
        let left = total - out.len();
        if left == 0 {
            break;
        }
        match op {
            Op::Byte => out.push(input.read_byte().unwrap()),
            Op::Buffered(n) => {
                let n = n.min(left);
                let mut dest = vec![0u8; n];
                let got = input.read_buffered(&mut dest, 0, n).unwrap().unwrap();
                out.extend_from_slice(&dest[..got]);
            }
            Op::Array(n) => {
                let n = n.min(left);
                let mut dest = vec![0u8; n];
                input.read_array(&mut dest, 0, n).unwrap();
                out.extend_from_slice(&dest);
            }
        }
    }
    let left = total - out.len();
    let mut dest = vec![0u8; left];
    input.read_array(&mut dest, 0, left).unwrap();
    out.extend_from_slice(&dest);
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn zero_copy_matches_buffered(
        data in proptest::collection::vec(any::<u8>(), 1..3000),
        mtu in 1usize..600,
        sizes in proptest::collection::vec(1usize..900, 1..8),
        fill in any::<bool>(),
    ) {
        let reads = plan_reads(data.len(), &sizes);

        let mut buffered = build(&data, mtu, mtu, usize::MAX, fill);
        let mut direct = build(&data, mtu, mtu, 0, fill);

        let a = drain(&mut buffered, &reads);
        let b = drain(&mut direct, &reads);
        prop_assert_eq!(&a, &data);
        prop_assert_eq!(&b, &data);
        prop_assert_eq!(buffered.stats().view_fills, 0);
        prop_assert_eq!(buffered.stats().zero_copy_bytes, 0);
        prop_assert_eq!(direct.state(), InputState::Empty);
    }

    #[test]
    fn mixed_reads_match_across_paths(
        data in proptest::collection::vec(any::<u8>(), 1..3000),
        mtu in 1usize..600,
        ops in proptest::collection::vec(op(), 1..24),
        fill in any::<bool>(),
    ) {
        let mut buffered = build(&data, mtu, mtu, usize::MAX, fill);
        let mut direct = build(&data, mtu, mtu, 0, fill);

        let a = run_plan(&mut buffered, data.len(), &ops);
        let b = run_plan(&mut direct, data.len(), &ops);
        prop_assert_eq!(&a, &data);
        prop_assert_eq!(&b, &data);
        prop_assert_eq!(buffered.state(), InputState::Empty);
        prop_assert_eq!(direct.state(), InputState::Empty);
    }

    #[test]
    fn segmentation_is_invisible(
        data in proptest::collection::vec(any::<u8>(), 0..2000),
        mtu in 1usize..64,
        threshold in prop_oneof![Just(0usize), Just(1024usize), Just(usize::MAX)],
        fill in any::<bool>(),
    ) {
        let len = data.len();

        let mut whole = build(&data, 0, 0, threshold, fill);
        let mut dest_whole = vec![0u8; len];
        whole.read_array(&mut dest_whole, 0, len).unwrap();

        let mut segmented = build(&data, mtu, mtu, threshold, fill);
        let mut dest_segmented = vec![0u8; len];
        segmented.read_array(&mut dest_segmented, 0, len).unwrap();

        prop_assert_eq!(&dest_whole, &data);
        prop_assert_eq!(&dest_segmented, &dest_whole);
    }

    #[test]
    fn reads_stay_inside_requested_range(
        data in proptest::collection::vec(any::<u8>(), 1..500),
        mtu in 0usize..64,
        dest_len in 1usize..300,
        offset_seed in any::<usize>(),
        length_seed in any::<usize>(),
        fill in any::<bool>(),
    ) {
        let offset = offset_seed % dest_len;
        let length = length_seed % (dest_len - offset + 1);

        let mut input = build(&data, mtu, mtu, usize::MAX, fill);
        let mut dest = vec![SENTINEL; dest_len];
        let copied = input.read_buffered(&mut dest, offset, length).unwrap();

        let n = copied.unwrap_or(0);
        prop_assert!(n <= length);
        prop_assert!(n <= data.len());
        prop_assert_eq!(&dest[offset..offset + n], &data[..n]);
        prop_assert!(dest[..offset].iter().all(|&b| b == SENTINEL));
        prop_assert!(dest[offset + n..].iter().all(|&b| b == SENTINEL));

        if data.len() - n >= length {
            let mut dest = vec![SENTINEL; dest_len];
            input.read_array(&mut dest, offset, length).unwrap();
            prop_assert_eq!(&dest[offset..offset + length], &data[n..n + length]);
            prop_assert!(dest[..offset].iter().all(|&b| b == SENTINEL));
            prop_assert!(dest[offset + length..].iter().all(|&b| b == SENTINEL));
        }
    }

    #[test]
    fn exhausted_buffers_are_released(
        chunks in 1usize..20,
        mtu in 1usize..32,
        sizes in proptest::collection::vec(1usize..40, 1..6),
        fill in any::<bool>(),
    ) {
        let data: Vec<u8> = (0..chunks * mtu).map(|i| i as u8).collect();
        let reads = plan_reads(data.len(), &sizes);

        let mut input = build(&data, mtu, mtu, usize::MAX, fill);
        let out = drain(&mut input, &reads);

        prop_assert_eq!(out, data);
        prop_assert_eq!(input.state(), InputState::Empty);
        let stats = input.stats();
        prop_assert_eq!(stats.pumps, stats.frees);
    }
}
