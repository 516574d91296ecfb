use std::io::{BufReader, BufWriter, Read, Write};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    data::{FeaId, Real},
    error::Result,
    storage::Store,
};

/// One persisted weight.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: FeaId,
    w: Real,
}

/// Writes every non-zero weight of `store` as a JSON array.
///
/// # Arguments
/// * `store` - The store to persist.
/// * `writer` - Where to write the model.
///
/// # Returns
/// The amount of weights written.
pub fn save_model<W: Write>(store: &dyn Store, writer: W) -> Result<usize> {
    let records: Vec<_> = store
        .dump()
        .into_iter()
        .map(|(id, w)| Record { id, w })
        .collect();

    let mut writer = BufWriter::new(writer);
    serde_json::to_writer(&mut writer, &records)?;
    writer.flush()?;

    info!(weights = records.len(); "saved model");
    Ok(records.len())
}

/// Restores the weights written by `save_model` into `store`.
///
/// # Returns
/// The amount of weights read.
pub fn load_model<R: Read>(store: &dyn Store, reader: R) -> Result<usize> {
    let records: Vec<Record> = serde_json::from_reader(BufReader::new(reader))?;
    let weights: Vec<_> = records.into_iter().map(|r| (r.id, r.w)).collect();
    store.restore(&weights)?;

    info!(weights = weights.len(); "loaded model");
    Ok(weights.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TrainErr,
        optimization::Sgd,
        storage::{Channel, LocalStore},
    };

    #[test]
    fn save_then_load() {
        let store = LocalStore::new(2, 0., || Sgd::new(1., 0.));
        store.push(Channel::Weight, &[4, 8, 15], &[0.5, 0., -2.], &[]).unwrap();

        let mut buf = Vec::new();
        assert_eq!(save_model(&store, &mut buf).unwrap(), 2);

        let other = LocalStore::new(3, 0., || Sgd::new(1., 0.));
        assert_eq!(load_model(&other, buf.as_slice()).unwrap(), 2);
        assert_eq!(other.dump(), [(4, 0.5), (15, -2.)]);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let store = LocalStore::new(1, 0., || Sgd::new(1., 0.));
        let err = load_model(&store, &b"not json"[..]).unwrap_err();
        assert!(matches!(err, TrainErr::Json(_)));
    }
}
