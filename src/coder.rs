//! A renormalizing range coder over [`FreqModel`]s, a
//! carryless lower/range-pair design with explicit carry-propagation handling
//! for words sitting right at a rollover boundary, specialized down to one
//! concrete instantiation: 32-bit words over a 64-bit range state. Unlike a
//! lookup-table entropy model with a power-of-two total, an adaptive
//! [`FreqModel`]'s total count is arbitrary, so narrowing divides by the
//! model's running total instead of shifting by a fixed `PRECISION`.

use std::io::{self, Read, Write};

use crate::freq::FreqModel;

const WORD_BITS: u32 = 32;
const TOP: u64 = 1 << WORD_BITS;

/// Tracks words whose value is undetermined because `lower` is sitting right
/// at a potential carry boundary (`0xffff_ffff...` about to roll over).
#[derive(Debug)]
enum Situation {
    Normal,
    Inverted { count: u64, first_word: u32 },
}

/// Encodes a sequence of symbols, each under its own (possibly distinct)
/// [`FreqModel`], emitting big-endian `u32` words to `sink` as soon as they
/// become fully determined by the narrowing range.
#[derive(Debug)]
pub struct RangeEncoder<W> {
    sink: W,
    lower: u64,
    range: u64,
    situation: Situation,
}

impl<W: Write> RangeEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            lower: 0,
            range: u64::MAX,
            situation: Situation::Normal,
        }
    }

    /// Narrows the current range to
    /// `symbol`'s interval under `model`, updates `model`'s counts, and
    /// writes out any words the narrowing has fully determined.
    pub fn step(&mut self, model: &mut FreqModel, symbol: usize) -> io::Result<()> {
        let total = model.total() as u64;
        let (cum, freq) = model.left_cumulative_and_frequency(symbol);
        self.narrow(cum as u64, freq as u64, total)?;
        model.step(symbol);
        Ok(())
    }

    fn narrow(&mut self, cum: u64, freq: u64, total: u64) -> io::Result<()> {
        let scale = self.range / total;
        let new_lower = self.lower.wrapping_add(scale * cum);
        let new_range = scale * freq;

        if let Situation::Inverted { count, first_word } = self.situation {
            if new_lower.wrapping_add(new_range) > new_lower {
                // The carry ambiguity resolved: we now know whether `lower`
                // rolled over while the inverted run was pending.
                let (first, rest) = if new_lower < self.lower {
                    (first_word.wrapping_add(1), 0u32)
                } else {
                    (first_word, u32::MAX)
                };
                self.sink.write_all(&first.to_be_bytes())?;
                for _ in 1..count {
                    self.sink.write_all(&rest.to_be_bytes())?;
                }
                self.situation = Situation::Normal;
            }
        }

        self.lower = new_lower;
        self.range = new_range;

        if self.range < TOP {
            let word = (self.lower >> WORD_BITS) as u32;
            self.range <<= WORD_BITS;
            self.lower <<= WORD_BITS;

            match &mut self.situation {
                Situation::Inverted { count, .. } => *count += 1,
                Situation::Normal => {
                    if self.lower.wrapping_add(self.range) > self.lower {
                        self.sink.write_all(&word.to_be_bytes())?;
                    } else {
                        self.situation = Situation::Inverted { count: 1, first_word: word };
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes the words needed to disambiguate the final symbol and returns
    /// the sink. Called once, after the very last symbol of the very last
    /// line. Any still-pending inverted run is
    /// resolved under the "no further carry" assumption, which is exactly
    /// what "no more symbols follow" means.
    pub fn flush(mut self) -> io::Result<W> {
        if let Situation::Inverted { count, first_word } = self.situation {
            self.sink.write_all(&first_word.to_be_bytes())?;
            for _ in 1..count {
                self.sink.write_all(&u32::MAX.to_be_bytes())?;
            }
        }
        // `range` stayed >= TOP at every step (the renormalization
        // invariant), so two more words of `lower` land unambiguously inside
        // the still-open interval.
        self.sink.write_all(&((self.lower >> WORD_BITS) as u32).to_be_bytes())?;
        self.sink.write_all(&(self.lower as u32).to_be_bytes())?;
        Ok(self.sink)
    }
}

/// Decodes a sequence of symbols written by [`RangeEncoder`], reading
/// big-endian `u32` words from `source` as renormalization requires.
#[derive(Debug)]
pub struct RangeDecoder<R> {
    source: R,
    lower: u64,
    range: u64,
    point: u64,
}

impl<R: Read> RangeDecoder<R> {
    /// Pre-fills `point` with the stream's first two words.
    pub fn new(mut source: R) -> io::Result<Self> {
        let mut point = 0u64;
        for _ in 0..(64 / WORD_BITS) {
            point = (point << WORD_BITS) | Self::read_word(&mut source)? as u64;
        }
        Ok(Self {
            source,
            lower: 0,
            range: u64::MAX,
            point,
        })
    }

    fn read_word(source: &mut R) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        match source.read_exact(&mut buf) {
            Ok(()) => Ok(u32::from_be_bytes(buf)),
            // A short read at end of stream behaves like trailing zero words,
            // for a backend that runs dry mid-word.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Decodes the symbol whose cumulative interval
    /// contains the current point under `model`, updates `model`, advances,
    /// and refills `point` from the byte stream as renormalization requires.
    pub fn step(&mut self, model: &mut FreqModel) -> io::Result<usize> {
        let symbol = self.peek(model);
        self.advance(model, symbol, true)?;
        Ok(symbol)
    }

    /// Identical symbol lookup, but never
    /// reads past the end of the stream — used only for the very last symbol
    /// of the very last line, where the coder cannot renormalize past
    /// end-of-stream.
    pub fn last_step(&mut self, model: &mut FreqModel) -> io::Result<usize> {
        let symbol = self.peek(model);
        self.advance(model, symbol, false)?;
        Ok(symbol)
    }

    fn peek(&self, model: &FreqModel) -> usize {
        let total = model.total() as u64;
        let scale = self.range / total;
        let quantile = (self.point.wrapping_sub(self.lower) / scale).min(total - 1);
        model.quantile_function(quantile as u32).0
    }

    fn advance(&mut self, model: &mut FreqModel, symbol: usize, refill: bool) -> io::Result<()> {
        let total = model.total() as u64;
        let (cum, freq) = model.left_cumulative_and_frequency(symbol);
        let scale = self.range / total;

        self.lower = self.lower.wrapping_add(scale * cum as u64);
        self.range = scale * freq as u64;
        model.step(symbol);

        if self.range < TOP {
            self.lower <<= WORD_BITS;
            self.range <<= WORD_BITS;
            self.point <<= WORD_BITS;
            if refill {
                self.point |= Self::read_word(&mut self.source)? as u64;
            }
        }
        Ok(())
    }
}
