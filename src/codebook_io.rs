//! The textual codebook file format.
//!
//! ```text
//! <line 1>: ratio, cluster_count, columns, well_seed_u32
//! for each cluster:
//!   for each column c in 0..C-1:
//!     <line>: |U_c|
//!     for each context u in U_c (ordered):
//!       <line>: u_as_ascii+33, s_lo, s_hi, alpha_q8
//!       <line>: ASCII-encoded q_lo map, length N, each byte = q_lo[i]+33
//!       <line>: ASCII-encoded q_hi map, length N, each byte = q_hi[i]+33
//! ```
//!
//! `alpha` is quantized to 8 bits (`round(alpha * 255)`) purely for the
//! serialized form; in memory it stays an `f64`. The `+33` offset keeps every
//! byte in the printable ASCII range, the same convention the quality strings
//! themselves use.

use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::alphabet::Alphabet;
use crate::codebook::{ClusterCodebookSet, ClusterSet, QuantizerPair};
use crate::config::{CLUSTER_ALPHABET_MAX, MAX_CODEBOOK_LINE_LENGTH};
use crate::error::{Error, Result};
use crate::quantizer::Quantizer;

const ASCII_OFFSET: u8 = 33;

fn read_line_checked<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line)?;
    if bytes_read == 0 {
        return Err(Error::MalformedCodebook("unexpected end of file".to_string()));
    }
    if line.len() > MAX_CODEBOOK_LINE_LENGTH {
        return Err(Error::MalformedCodebook(format!(
            "line exceeds {MAX_CODEBOOK_LINE_LENGTH} bytes"
        )));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::MalformedCodebook(format!("bad {what}: {field:?}")))
}

fn write_map<W: Write>(writer: &mut W, map: &[u8]) -> Result<()> {
    let encoded: Vec<u8> = map.iter().map(|&b| b.wrapping_add(ASCII_OFFSET)).collect();
    writer.write_all(&encoded)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn read_map<R: BufRead>(reader: &mut R, expected_len: usize) -> Result<Vec<u8>> {
    let line = read_line_checked(reader)?;
    let bytes = line.into_bytes();
    if bytes.len() != expected_len {
        return Err(Error::MalformedCodebook(format!(
            "expected a {expected_len}-byte map, got {}",
            bytes.len()
        )));
    }
    Ok(bytes.iter().map(|&b| b.wrapping_sub(ASCII_OFFSET)).collect())
}

/// Writes `set` in the textual codebook format described in this module's docs.
pub fn write_codebook<W: Write>(writer: &mut W, set: &ClusterSet) -> Result<()> {
    let columns = set.columns();
    writeln!(writer, "{},{},{},{}", set.rate, set.clusters.len(), columns, set.seed)?;

    for cluster in &set.clusters {
        for c in 0..columns {
            let union = cluster.union_alphabet(c);
            writeln!(writer, "{}", union.size())?;

            for &ctx in union.symbols() {
                let (pair, _) = cluster
                    .pair_for_context(c, ctx)
                    .expect("context drawn from this column's own union alphabet");
                let s_lo = pair.lo.output_alphabet().size();
                let s_hi = pair.hi.output_alphabet().size();
                let alpha_q8 = (pair.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
                writeln!(writer, "{},{},{},{}", ctx.wrapping_add(ASCII_OFFSET), s_lo, s_hi, alpha_q8)?;
                write_map(writer, pair.lo.reconstruction_map())?;
                write_map(writer, pair.hi.reconstruction_map())?;
            }
        }
    }
    Ok(())
}

/// Reads a [`ClusterSet`] back from the textual format, against the given
/// input alphabet (shared by every quantizer in the file).
pub fn read_codebook<R: BufRead>(reader: &mut R, input_alphabet: Rc<Alphabet>) -> Result<ClusterSet> {
    let header = read_line_checked(reader)?;
    let fields: Vec<&str> = header.split(',').collect();
    if fields.len() != 4 {
        return Err(Error::MalformedCodebook(format!(
            "header must have 4 comma-separated fields, got {}",
            fields.len()
        )));
    }
    let rate: f64 = parse_field(fields[0], "rate")?;
    let cluster_count: usize = parse_field(fields[1], "cluster_count")?;
    let columns: u32 = parse_field(fields[2], "columns")?;
    let seed: u32 = parse_field(fields[3], "well_seed_u32")?;

    if cluster_count > CLUSTER_ALPHABET_MAX {
        return Err(Error::MalformedCodebook(format!(
            "cluster_count {cluster_count} exceeds the {CLUSTER_ALPHABET_MAX}-state cluster-id model"
        )));
    }

    let n = input_alphabet.size();
    let mut clusters = Vec::with_capacity(cluster_count);

    for _ in 0..cluster_count {
        let mut unions: Vec<Rc<Alphabet>> = Vec::with_capacity(columns as usize);
        let mut pairs = Vec::new();
        let mut column_offset = Vec::with_capacity(columns as usize + 1);

        for _c in 0..columns {
            column_offset.push(pairs.len());
            let union_size: usize = parse_field(&read_line_checked(reader)?, "|U_c|")?;

            let mut ctx_symbols = Vec::with_capacity(union_size);
            for _ in 0..union_size {
                let header = read_line_checked(reader)?;
                let fields: Vec<&str> = header.split(',').collect();
                if fields.len() != 4 {
                    return Err(Error::MalformedCodebook(format!(
                        "context line must have 4 comma-separated fields, got {}",
                        fields.len()
                    )));
                }
                let ctx_ascii: u8 = parse_field(fields[0], "context byte")?;
                let _s_lo: usize = parse_field(fields[1], "s_lo")?;
                let _s_hi: usize = parse_field(fields[2], "s_hi")?;
                let alpha_q8: u8 = parse_field(fields[3], "alpha_q8")?;

                let ctx = ctx_ascii.wrapping_sub(ASCII_OFFSET);
                let lo_map = read_map(reader, n)?;
                let hi_map = read_map(reader, n)?;

                let lo = Quantizer::from_map(Rc::clone(&input_alphabet), lo_map);
                let hi = Quantizer::from_map(Rc::clone(&input_alphabet), hi_map);
                let alpha = alpha_q8 as f64 / 255.0;

                ctx_symbols.push(ctx);
                pairs.push(QuantizerPair { lo, hi, alpha });
            }

            unions.push(Rc::new(Alphabet::from_symbols(ctx_symbols)));
        }
        column_offset.push(pairs.len());

        clusters.push(ClusterCodebookSet::from_parts(
            Rc::clone(&input_alphabet),
            columns,
            unions,
            pairs,
            column_offset,
        ));
    }

    Ok(ClusterSet { seed, rate, clusters })
}
