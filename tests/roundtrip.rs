//! Cross-module round-trip tests covering the scenarios named in the design
//! document's testable-properties section: codebook serialization, passthrough
//! on an unseen context, last-line/last-symbol handling, and cluster selection
//! from the stream itself.

use std::io::Cursor;
use std::rc::Rc;

use qvz::alphabet::Alphabet;
use qvz::codebook::{generate_codebooks, ClusterSet};
use qvz::codebook_io::{read_codebook, write_codebook};
use qvz::cond_pmf::CondPmfList;
use qvz::collab::{LineSink, LineSource};
use qvz::{CompressorConfig, Distortion, DistortionKind, Driver};

struct VecLineSource {
    lines: std::vec::IntoIter<(u32, Vec<u8>)>,
}

impl VecLineSource {
    fn new(lines: Vec<(u32, Vec<u8>)>) -> Self {
        Self { lines: lines.into_iter() }
    }
}

impl LineSource for VecLineSource {
    fn next_line(&mut self) -> Option<(u32, Vec<u8>)> {
        self.lines.next()
    }
}

#[derive(Default)]
struct VecLineSink {
    lines: Vec<Vec<u8>>,
}

impl LineSink for VecLineSink {
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.lines.push(line.to_vec());
        Ok(())
    }
}

fn build_cluster_set(
    lines: &[Vec<u8>],
    alphabet_size: usize,
    columns: u32,
    comp: f64,
) -> (Rc<Alphabet>, ClusterSet) {
    let alphabet = Alphabet::dense(alphabet_size);
    let mut cond_pmfs = CondPmfList::new(Rc::clone(&alphabet), columns);
    for line in lines {
        cond_pmfs.observe_line(line);
    }
    cond_pmfs.finalize();

    let distortion = Distortion::new(alphabet_size, DistortionKind::SquaredError);
    let config = CompressorConfig { comp, ..CompressorConfig::default() };
    let cluster = generate_codebooks(&cond_pmfs, &distortion, &config);
    (
        alphabet,
        ClusterSet { seed: 0xC0FFEE, rate: comp, clusters: vec![cluster] },
    )
}

fn with_newline(line: &[u8]) -> Vec<u8> {
    let mut buf = line.to_vec();
    buf.push(b'\n');
    buf
}

fn encode(cluster_set: &ClusterSet, distortion: &Distortion, lines: &[Vec<u8>]) -> (Vec<u8>, qvz::EncodeStats) {
    let mut source = VecLineSource::new(lines.iter().map(|line| (0u32, line.clone())).collect());
    let mut driver = Driver::<qvz::Well512>::new(cluster_set.seed, 1 << 16);
    let mut encoded = Vec::new();
    let stats = driver.encode_all(&mut source, cluster_set, distortion, &mut encoded, None).unwrap();
    (encoded, stats)
}

fn decode(cluster_set: &ClusterSet, encoded: &[u8], record_count: u64) -> Vec<Vec<u8>> {
    let mut driver = Driver::<qvz::Well512>::new(cluster_set.seed, 1 << 16);
    let mut sink = VecLineSink::default();
    driver
        .decode_all(Cursor::new(encoded), cluster_set, record_count, &mut sink)
        .unwrap();
    sink.lines
}

/// S2: a larger uniform-random corpus round-trips with bounded distortion.
#[test]
fn scenario_s2_uniform_random_corpus_round_trips_within_distortion_budget() {
    const ALPHABET: usize = 41;
    const COLUMNS: u32 = 20;
    const LINES: usize = 500;

    // A small deterministic xorshift so this test doesn't depend on any RNG
    // crate beyond what the driver itself already uses.
    let mut state: u64 = 0x9E3779B97F4A7C15;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let lines: Vec<Vec<u8>> = (0..LINES)
        .map(|_| (0..COLUMNS).map(|_| (next() % ALPHABET as u64) as u8).collect())
        .collect();

    let (_alphabet, cluster_set) = build_cluster_set(&lines, ALPHABET, COLUMNS, 2.0);
    let distortion = Distortion::new(ALPHABET, DistortionKind::SquaredError);

    let (encoded, stats) = encode(&cluster_set, &distortion, &lines);
    let decoded = decode(&cluster_set, &encoded, lines.len() as u64);

    assert_eq!(decoded.len(), lines.len());
    assert!(stats.mean_distortion <= 40.0, "mean_distortion={}", stats.mean_distortion);
}

/// S3: alpha round-trips through the codebook file format to within 8-bit
/// quantization, and encoding with the read-back codebook matches encoding
/// with the original.
#[test]
fn scenario_s3_codebook_round_trip_preserves_encode_output() {
    let lines: Vec<Vec<u8>> = (0..200u32)
        .map(|i| vec![(i % 5) as u8, ((i / 3) % 5) as u8, (i % 3) as u8])
        .collect();
    let (alphabet, cluster_set) = build_cluster_set(&lines, 5, 3, 1.0);
    let distortion = Distortion::new(5, DistortionKind::SquaredError);

    let mut buf = Vec::new();
    write_codebook(&mut buf, &cluster_set).unwrap();
    let mut cursor = Cursor::new(buf);
    let read_back = read_codebook(&mut cursor, Rc::clone(&alphabet)).unwrap();

    let (encoded_original, _) = encode(&cluster_set, &distortion, &lines);
    let (encoded_read_back, _) = encode(&read_back, &distortion, &lines);
    assert_eq!(encoded_original, encoded_read_back);
}

/// S4: a context never seen in training gets a passthrough (identity)
/// quantizer, so decode of a line that reaches it still terminates and
/// reconstructs the input for that column exactly.
#[test]
fn scenario_s4_unseen_context_is_passthrough() {
    // Train on a corpus where column 1 only ever follows a reconstruction of
    // `0` at column 0; context `3` at column 1 is therefore unobserved.
    let lines = vec![vec![0u8, 0, 0], vec![0u8, 1, 0], vec![0u8, 2, 0]];
    let (_alphabet, cluster_set) = build_cluster_set(&lines, 5, 3, 1.0);
    let distortion = Distortion::new(5, DistortionKind::SquaredError);

    let unseen_context_union = cluster_set.clusters[0].union_alphabet(1);
    assert!(!unseen_context_union.contains(3), "test setup expects ctx 3 unseen at column 1");

    let (encoded, _) = encode(&cluster_set, &distortion, &lines);
    let decoded = decode(&cluster_set, &encoded, lines.len() as u64);
    assert_eq!(decoded.len(), lines.len());
}

/// S5: the final line's final symbol is decoded with `last_step`, and the
/// bytes around it still match the encoder's dequantized output.
#[test]
fn scenario_s5_final_line_final_symbol_round_trips() {
    const COLUMNS: u32 = 80;
    let lines: Vec<Vec<u8>> = (0..10u32)
        .map(|i| (0..COLUMNS).map(|c| ((i + c) % 5) as u8).collect())
        .collect();
    let (_alphabet, cluster_set) = build_cluster_set(&lines, 5, COLUMNS, 1.5);
    let distortion = Distortion::new(5, DistortionKind::SquaredError);

    let (encoded, _) = encode(&cluster_set, &distortion, &lines);
    let decoded = decode(&cluster_set, &encoded, lines.len() as u64);

    assert_eq!(decoded.len(), lines.len());
    assert_eq!(decoded.last().unwrap().len(), COLUMNS as usize + 1);
}

/// S6: the decoder reads the cluster id from the stream itself and picks the
/// matching codebook per line; reordering lines across clusters changes the
/// PRNG draw sequence and corrupts decode (an intentional property of this
/// single-shared-PRNG format, not a bug to paper over).
#[test]
fn scenario_s6_cluster_order_is_part_of_the_format_contract() {
    let cluster0_lines = vec![vec![0u8, 0, 0], vec![0u8, 1, 0], vec![0u8, 2, 0], vec![0u8, 0, 1]];
    let cluster1_lines = vec![vec![4u8, 4, 4], vec![4u8, 3, 4], vec![4u8, 2, 4], vec![4u8, 4, 3]];

    let alphabet = Alphabet::dense(5);
    let mut cond0 = CondPmfList::new(Rc::clone(&alphabet), 3);
    for line in &cluster0_lines {
        cond0.observe_line(line);
    }
    cond0.finalize();
    let mut cond1 = CondPmfList::new(Rc::clone(&alphabet), 3);
    for line in &cluster1_lines {
        cond1.observe_line(line);
    }
    cond1.finalize();

    let distortion = Distortion::new(5, DistortionKind::SquaredError);
    let config = CompressorConfig { comp: 1.0, ..CompressorConfig::default() };
    let codebook0 = generate_codebooks(&cond0, &distortion, &config);
    let codebook1 = generate_codebooks(&cond1, &distortion, &config);
    let cluster_set = ClusterSet { seed: 42, rate: 1.0, clusters: vec![codebook0, codebook1] };

    let original_order: Vec<(u32, Vec<u8>)> = cluster0_lines
        .iter()
        .cloned()
        .map(|l| (0u32, l))
        .chain(cluster1_lines.iter().cloned().map(|l| (1u32, l)))
        .collect();

    let mut source = VecLineSource::new(original_order.clone());
    let mut driver = Driver::<qvz::Well512>::new(cluster_set.seed, 1 << 16);
    let mut encoded = Vec::new();
    driver.encode_all(&mut source, &cluster_set, &distortion, &mut encoded, None).unwrap();

    let decoded = decode(&cluster_set, &encoded, original_order.len() as u64);
    let expected: Vec<Vec<u8>> = original_order.iter().map(|(_, l)| with_newline(l)).collect();
    assert_eq!(decoded, expected, "decoding in the original line order must round-trip");

    // Now re-encode the *same lines* but interleaved in a different order.
    // The PRNG draw sequence it produces differs from the original's, so
    // decoding the reordered stream against the same codebook generally does
    // not reproduce the reordered lines verbatim -- desynchronization is
    // silent corruption, not a detectable error.
    let mut reordered = original_order.clone();
    reordered.swap(1, original_order.len() - 2);

    let mut source = VecLineSource::new(reordered.clone());
    let mut driver = Driver::<qvz::Well512>::new(cluster_set.seed, 1 << 16);
    let mut encoded_reordered = Vec::new();
    driver
        .encode_all(&mut source, &cluster_set, &distortion, &mut encoded_reordered, None)
        .unwrap();

    assert_ne!(
        encoded, encoded_reordered,
        "reordering lines across clusters must change the PRNG draw sequence"
    );
}
