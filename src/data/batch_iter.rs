use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{FeaId, Real, RowBlock};
use crate::{
    error::{Result, TrainErr},
    range::Range,
};

/// Partition-aware reader producing fixed size raw batches.
///
/// The file's bytes are split with `Range::segment` and a line belongs to the
/// part holding its first byte, so the parts of one file are disjoint and
/// cover every line. Lines are read as batches are requested, except when
/// shuffling: a shuffled partition is loaded whole, so it costs memory in
/// proportion to the partition's size.
#[derive(Debug)]
pub struct BatchIter {
    rows: Rows,
    batch_size: usize,
    neg_sampling: f32,
    rng: StdRng,
}

#[derive(Debug)]
enum Rows {
    Stream(PartReader),
    Shuffled {
        lines: Vec<(u64, String)>,
        cursor: usize,
    },
}

/// A cursor over the lines starting inside one byte range of a file.
#[derive(Debug)]
struct PartReader {
    reader: BufReader<File>,
    pos: u64,
    end: u64,
    line: String,
}

impl PartReader {
    fn open(path: &Path, part_idx: usize, num_parts: usize) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len() as usize;
        let rg = Range::new(0, size).segment(part_idx, num_parts);

        let mut reader = BufReader::new(file);
        let mut pos = rg.begin as u64;

        // a line starting exactly at `begin` is ours, anything before the next
        // newline belongs to the previous part
        if pos > 0 {
            reader.seek(SeekFrom::Start(pos - 1))?;
            let mut skipped = Vec::new();
            pos = pos - 1 + reader.read_until(b'\n', &mut skipped)? as u64;
        }

        Ok(Self {
            reader,
            pos,
            end: rg.end as u64,
            line: String::new(),
        })
    }

    /// Reads the next line of the part into `self.line`.
    ///
    /// # Returns
    /// The line's byte offset, or `None` past the end of the part.
    fn advance(&mut self) -> Result<Option<u64>> {
        if self.pos >= self.end {
            return Ok(None);
        }

        self.line.clear();
        let n = self.reader.read_line(&mut self.line)?;
        if n == 0 {
            return Ok(None);
        }

        let offset = self.pos;
        self.pos += n as u64;
        Ok(Some(offset))
    }

    fn collect_lines(mut self) -> Result<Vec<(u64, String)>> {
        let mut lines = Vec::new();
        while let Some(offset) = self.advance()? {
            lines.push((offset, self.line.trim_end().to_string()));
        }

        Ok(lines)
    }
}

impl BatchIter {
    /// Opens the `part_idx`-th of `num_parts` partitions of `filename`.
    ///
    /// # Arguments
    /// * `filename` - The data file.
    /// * `format` - The data format, only `libsvm` is understood.
    /// * `part_idx` - Which partition to read.
    /// * `num_parts` - How many partitions the file is split into.
    /// * `batch_size` - The maximum amount of rows per batch.
    /// * `shuffle` - Whether to permute the rows of the partition.
    /// * `neg_sampling` - The probability of keeping each negative row.
    ///
    /// # Returns
    /// A new `BatchIter`, an io error if the file can't be read or an
    /// `InvalidConfig` for unknown formats and invalid partitions.
    pub fn new<P: AsRef<Path>>(
        filename: P,
        format: &str,
        part_idx: usize,
        num_parts: usize,
        batch_size: usize,
        shuffle: bool,
        neg_sampling: f32,
    ) -> Result<Self> {
        if format != "libsvm" {
            return Err(TrainErr::InvalidConfig(format!(
                "unknown data format '{format}'"
            )));
        }

        if part_idx >= num_parts || batch_size == 0 {
            return Err(TrainErr::InvalidConfig(format!(
                "invalid partition {part_idx}/{num_parts} with batch size {batch_size}"
            )));
        }

        let part = PartReader::open(filename.as_ref(), part_idx, num_parts)?;
        let (begin, end) = (part.pos, part.end);
        let mut rng = StdRng::from_os_rng();

        let rows = if shuffle {
            let mut lines = part.collect_lines()?;
            lines.shuffle(&mut rng);
            Rows::Shuffled { lines, cursor: 0 }
        } else {
            Rows::Stream(part)
        };

        debug!(
            part = part_idx,
            parts = num_parts,
            begin = begin,
            end = end,
            shuffle = shuffle;
            "opened {}", filename.as_ref().display()
        );

        Ok(Self {
            rows,
            batch_size,
            neg_sampling,
            rng,
        })
    }

    /// Reseeds the sampling rng, making negative sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Reads the next batch.
    ///
    /// # Returns
    /// `None` once the partition is exhausted, or a `MalformedBatch` error
    /// with the byte offset of the offending line.
    pub fn next_batch(&mut self) -> Result<Option<RowBlock<FeaId>>> {
        let mut blk = RowBlock::new();
        let mut index = Vec::new();
        let mut value = Vec::new();

        while blk.len() < self.batch_size {
            let label = match &mut self.rows {
                Rows::Stream(part) => match part.advance()? {
                    Some(offset) => parse_libsvm(offset, &part.line, &mut index, &mut value)?,
                    None => break,
                },
                Rows::Shuffled { lines, cursor } => match lines.get(*cursor) {
                    Some((offset, line)) => {
                        *cursor += 1;
                        parse_libsvm(*offset, line, &mut index, &mut value)?
                    }
                    None => break,
                },
            };

            let Some(label) = label else {
                continue;
            };

            if label < 0. && self.neg_sampling < 1. && self.rng.random::<f32>() >= self.neg_sampling {
                continue;
            }

            blk.push_row(label, &index, Some(&value));
        }

        Ok((!blk.is_empty()).then_some(blk))
    }
}

/// Parses `label idx:val idx:val ...` into `index`/`value`.
///
/// Blank lines and `#` comments yield `None`.
fn parse_libsvm(
    offset: u64,
    line: &str,
    index: &mut Vec<FeaId>,
    value: &mut Vec<Real>,
) -> Result<Option<Real>> {
    index.clear();
    value.clear();

    let line = line.split('#').next().unwrap_or_default().trim();
    let mut tokens = line.split_whitespace();
    let Some(label) = tokens.next() else {
        return Ok(None);
    };

    let malformed = |detail: String| TrainErr::MalformedBatch { offset, detail };

    let label: Real = label
        .parse()
        .map_err(|_| malformed(format!("invalid label '{label}'")))?;

    for tok in tokens {
        let (idx, val) = tok
            .split_once(':')
            .ok_or_else(|| malformed(format!("expected idx:val, got '{tok}'")))?;

        index.push(
            idx.parse()
                .map_err(|_| malformed(format!("invalid feature id '{idx}'")))?,
        );
        value.push(
            val.parse()
                .map_err(|_| malformed(format!("invalid value '{val}'")))?,
        );
    }

    Ok(Some(if label > 0. { 1. } else { -1. }))
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn write_tmp(content: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = env::temp_dir().join(format!("batch_iter_{}_{n}.txt", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    fn ten_rows() -> PathBuf {
        let content: String = (0..10)
            .map(|i| format!("{} {}:1 {}:0.5\n", i % 2, i, i + 100))
            .collect();
        write_tmp(&content)
    }

    fn drain(mut iter: BatchIter) -> Vec<RowBlock<FeaId>> {
        let mut out = Vec::new();
        while let Some(blk) = iter.next_batch().unwrap() {
            out.push(blk);
        }
        out
    }

    #[test]
    fn batches_respect_partition_and_size() {
        let path = ten_rows();

        // 14 bytes per line, part 1 of 3 holds bytes 47..94 => lines 4..7
        let iter = BatchIter::new(&path, "libsvm", 1, 3, 2, false, 1.).unwrap();
        let batches = drain(iter);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[0].row_index(0), &[4, 104]);
        assert_eq!(batches[0].label, [-1., 1.]);
        assert_eq!(batches[1].row_value(0), Some(&[1., 0.5][..]));
    }

    #[test]
    fn parts_cover_every_row_once() {
        let path = ten_rows();
        let mut seen = Vec::new();

        for part in 0..4 {
            let iter = BatchIter::new(&path, "libsvm", part, 4, 3, true, 1.).unwrap();
            for blk in drain(iter) {
                seen.extend(blk.index.iter().copied().filter(|&id| id < 100));
            }
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn negative_sampling_only_drops_negatives() {
        let path = ten_rows();
        let iter = BatchIter::new(&path, "libsvm", 0, 1, 100, false, 0.01)
            .unwrap()
            .with_seed(7);

        let labels: Vec<_> = drain(iter).into_iter().flat_map(|b| b.label).collect();
        assert_eq!(labels.iter().filter(|&&l| l > 0.).count(), 5);
        assert!(labels.len() < 10);
    }

    #[test]
    fn malformed_lines_report_their_offset() {
        let path = write_tmp("1 1:1\n\n# comment\n1 2-1\n");
        let mut iter = BatchIter::new(&path, "libsvm", 0, 1, 10, false, 1.).unwrap();

        match iter.next_batch() {
            Err(TrainErr::MalformedBatch { offset, .. }) => assert_eq!(offset, 17),
            other => panic!("expected a malformed batch, got {other:?}"),
        }
    }

    #[test]
    fn parts_split_mid_line_keep_whole_rows() {
        let path = write_tmp("1 1:1 2:1 3:1 4:1 5:1\n-1 6:1\n1 7:1\n");
        let mut seen = Vec::new();

        for part in 0..5 {
            let iter = BatchIter::new(&path, "libsvm", part, 5, 10, false, 1.).unwrap();
            for blk in drain(iter) {
                for i in 0..blk.len() {
                    seen.push(blk.row_index(i).to_vec());
                }
            }
        }

        seen.sort_unstable();
        assert_eq!(seen, [vec![1, 2, 3, 4, 5], vec![6], vec![7]]);
    }

    #[test]
    fn unshuffled_parts_are_read_as_batches_are_requested() {
        let content: String = (0..2000).map(|i| format!("1 {i}:1\n")).collect();
        let streamed = write_tmp(&content);
        let shuffled = write_tmp(&content);

        let mut stream = BatchIter::new(&streamed, "libsvm", 0, 1, 2, false, 1.).unwrap();
        let mut buffered = BatchIter::new(&shuffled, "libsvm", 0, 1, 2, true, 1.).unwrap();
        assert_eq!(stream.next_batch().unwrap().unwrap().len(), 2);
        assert_eq!(buffered.next_batch().unwrap().unwrap().len(), 2);

        // past the reader's buffer nothing is left once the files are emptied
        File::create(&streamed).unwrap();
        File::create(&shuffled).unwrap();

        let rows = |iter| drain(iter).iter().map(RowBlock::len).sum::<usize>();
        assert!(rows(stream) < 1998);
        assert_eq!(rows(buffered), 1998);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let path = ten_rows();
        assert!(matches!(
            BatchIter::new(&path, "criteo", 0, 1, 10, false, 1.),
            Err(TrainErr::InvalidConfig(_))
        ));
    }
}
