use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{data::Real, error::Result};

/// Where prediction results go.
///
/// Batches finish in any order, so the order of the written batches is
/// unspecified. The values of one batch are written together.
pub trait PredictionSink: Send + Sync {
    /// Writes the predictions of one batch.
    fn write(&self, preds: &[Real]) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Discards every prediction.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PredictionSink for NullSink {
    fn write(&self, _preds: &[Real]) -> Result<()> {
        Ok(())
    }
}

/// Writes one prediction per line to a file.
#[derive(Debug)]
pub struct FileSink {
    out: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Creates a new `FileSink`, truncating `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl PredictionSink for FileSink {
    fn write(&self, preds: &[Real]) -> Result<()> {
        let mut out = self.out.lock();
        for p in preds {
            writeln!(out, "{p}")?;
        }

        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}

/// A `FileSink` for a non empty `pred_out`, a `NullSink` otherwise.
pub fn create_sink(pred_out: &str) -> Result<Arc<dyn PredictionSink>> {
    if pred_out.is_empty() {
        return Ok(Arc::new(NullSink));
    }

    Ok(Arc::new(FileSink::create(pred_out)?))
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::*;

    #[test]
    fn file_sink_writes_a_line_per_prediction() {
        let path = env::temp_dir().join(format!("sink_{}.txt", std::process::id()));
        let sink = create_sink(path.to_str().unwrap()).unwrap();

        sink.write(&[0.25, 0.5]).unwrap();
        sink.write(&[1.]).unwrap();
        sink.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "0.25\n0.5\n1\n");
    }

    #[test]
    fn empty_path_discards() {
        let sink = create_sink("").unwrap();
        assert!(sink.write(&[0.5]).is_ok());
    }
}
